use super::error::{self, Result};
use super::{
    is_reserved_option_name, Deprecated, OptionArg, OptionKey, OptionStore, UserOption,
};
use crate::diagnostics::Diagnostic;
use crate::warnings;
use lazy_static::lazy_static;
use mason_lang::{Node, NodeKind};
use regex::Regex;
use snafu::ensure;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

lazy_static! {
    static ref OPTION_NAME: Regex = Regex::new("^[a-zA-Z0-9_-]+$").unwrap();
}

/// Evaluates a `meson_options.txt` file under its restricted grammar: a
/// sequence of `option()` calls whose arguments are literals. Declared
/// options land in the store under the owning subproject's scope, with
/// matching command-line values applied immediately.
pub struct OptionInterpreter<'a> {
    store: &'a mut OptionStore,
    subproject: String,
    /// Command-line `key=value` pairs that belong to this scope.
    cmd_line_options: BTreeMap<String, String>,
    declared: Vec<String>,
}

impl<'a> OptionInterpreter<'a> {
    pub fn new(
        store: &'a mut OptionStore,
        subproject: &str,
        command_line_options: &[String],
    ) -> Result<Self> {
        let mut cmd_line_options = BTreeMap::new();
        let sbprefix = format!("{}:", subproject);
        for entry in command_line_options {
            let scoped = if subproject.is_empty() {
                // Options addressed to a subproject are not ours; skip
                // them without error.
                if entry.contains(':') {
                    continue;
                }
                entry.as_str()
            } else {
                match entry.strip_prefix(&sbprefix) {
                    Some(rest) => rest,
                    None => continue,
                }
            };
            let (key, value) = scoped.split_once('=').ok_or_else(|| {
                error::MissingEqualsSnafu { option: entry }.build()
            })?;
            cmd_line_options.insert(key.to_string(), value.to_string());
        }
        Ok(OptionInterpreter {
            store,
            subproject: subproject.to_string(),
            cmd_line_options,
            declared: Vec::new(),
        })
    }

    pub fn process(&mut self, option_file: &Path) -> std::result::Result<(), Diagnostic> {
        let code = fs::read_to_string(option_file).map_err(|e| {
            Diagnostic::option(format!(
                "Could not read option file {}: {}",
                option_file.display(),
                e
            ))
        })?;
        let ast = mason_lang::parse(&code).map_err(|e| {
            let mut diag: Diagnostic = e.into();
            if let Some(loc) = diag.location.as_mut() {
                loc.file = option_file.to_path_buf();
            }
            diag
        })?;
        let lines = match ast.kind {
            NodeKind::CodeBlock(lines) => lines,
            _ => return Err(Diagnostic::internal("option file AST root is not a code block")),
        };
        for line in &lines {
            self.evaluate_statement(line).map_err(|e| {
                Diagnostic::from(e).or_location(option_file, line.line, line.col)
            })?;
        }
        self.check_for_bad_options();
        Ok(())
    }

    fn evaluate_statement(&mut self, node: &Node) -> Result<()> {
        let (name, args) = match &node.kind {
            NodeKind::Function { name, args } => (name, args),
            _ => {
                return error::ValidationSnafu {
                    message: "Option file may only contain option definitions.",
                }
                .fail()
            }
        };
        ensure!(
            name == "option",
            error::ValidationSnafu {
                message: "Only calls to option() are allowed in option files.",
            }
        );
        ensure!(
            !args.order_error,
            error::ValidationSnafu {
                message: "All keyword arguments must be after positional arguments.",
            }
        );
        let positional: Vec<OptionArg> = args
            .positional
            .iter()
            .map(|a| reduce_single(a))
            .collect::<Result<_>>()?;
        let mut kwargs: BTreeMap<String, OptionArg> = BTreeMap::new();
        for (key, value) in &args.keyword {
            kwargs.insert(key.clone(), reduce_single(value)?);
        }
        ensure!(
            positional.len() == 1,
            error::ValidationSnafu {
                message: "Option() must have one (and only one) positional argument.",
            }
        );
        let opt_name = match &positional[0] {
            OptionArg::Str(s) => s.clone(),
            _ => {
                return error::ValidationSnafu {
                    message: "Positional argument must be a string.",
                }
                .fail()
            }
        };
        ensure!(OPTION_NAME.is_match(&opt_name), error::BadNameSnafu);
        ensure!(
            !is_reserved_option_name(&opt_name),
            error::ReservedNameSnafu { name: opt_name }
        );
        let option = self.build_option(&opt_name, kwargs)?;
        let key = OptionKey::project(&opt_name, &self.subproject);
        self.store.add_project_option(key.clone(), option)?;
        self.declared.push(opt_name.clone());
        if let Some(value) = self.cmd_line_options.get(&opt_name).cloned() {
            self.store
                .set_option(&opt_name, Some(&self.subproject), &value)?;
        }
        Ok(())
    }

    fn build_option(
        &self,
        name: &str,
        mut kwargs: BTreeMap<String, OptionArg>,
    ) -> Result<UserOption> {
        let opt_type = match kwargs.remove("type") {
            Some(OptionArg::Str(t)) => t,
            Some(_) => {
                return error::ValidationSnafu {
                    message: "Option type must be a string.",
                }
                .fail()
            }
            None => {
                return error::ValidationSnafu {
                    message: "Option call missing mandatory 'type' keyword argument.",
                }
                .fail()
            }
        };
        let description = match kwargs.remove("description") {
            Some(OptionArg::Str(d)) => d,
            Some(_) => {
                return error::ValidationSnafu {
                    message: "Option description must be a string.",
                }
                .fail()
            }
            None => String::new(),
        };
        let yielding = match kwargs.remove("yield") {
            Some(OptionArg::Bool(y)) => y,
            Some(_) => {
                return error::ValidationSnafu {
                    message: "Value of 'yield' must be a boolean.",
                }
                .fail()
            }
            None => false,
        };
        let deprecated = match kwargs.remove("deprecated") {
            None => Deprecated::No,
            Some(OptionArg::Bool(true)) => Deprecated::Yes,
            Some(OptionArg::Bool(false)) => Deprecated::No,
            Some(OptionArg::Str(replacement)) => Deprecated::Renamed(replacement),
            Some(OptionArg::List(items)) => {
                let mut values = Vec::new();
                for item in items {
                    match item {
                        OptionArg::Str(s) => values.push(s),
                        _ => {
                            return error::ValidationSnafu {
                                message: "Deprecated value list elements must be strings.",
                            }
                            .fail()
                        }
                    }
                }
                Deprecated::Values(values)
            }
            Some(_) => {
                return error::ValidationSnafu {
                    message: "Value of 'deprecated' must be a boolean, string or list of strings.",
                }
                .fail()
            }
        };

        let permitted: &[&str] = match opt_type.as_str() {
            "string" | "boolean" | "feature" => &["value"],
            "combo" => &["value", "choices"],
            "integer" => &["value", "min", "max"],
            "array" => &["value", "choices"],
            other => {
                return error::ValidationSnafu {
                    message: format!("Unknown type {}.", other),
                }
                .fail()
            }
        };
        let bad: Vec<String> = kwargs
            .keys()
            .filter(|k| !permitted.contains(&k.as_str()))
            .cloned()
            .collect();
        if !bad.is_empty() {
            return error::ValidationSnafu {
                message: format!(
                    "Invalid kwargs for option \"{}\": \"{}\"",
                    name,
                    bad.join(" ")
                ),
            }
            .fail();
        }

        let choices = match kwargs.remove("choices") {
            None => None,
            Some(OptionArg::List(items)) => {
                let mut choices = Vec::new();
                for item in items {
                    match item {
                        OptionArg::Str(s) => choices.push(s),
                        _ => {
                            return error::ValidationSnafu {
                                message: "Choice elements must be strings.",
                            }
                            .fail()
                        }
                    }
                }
                Some(choices)
            }
            Some(_) => {
                return error::ValidationSnafu {
                    message: "Choices must be an array.",
                }
                .fail()
            }
        };
        let value = kwargs.remove("value");

        let int_bound = |kwargs: &mut BTreeMap<String, OptionArg>, key: &str| -> Result<Option<i64>> {
            match kwargs.remove(key) {
                None => Ok(None),
                Some(OptionArg::Int(i)) => Ok(Some(i)),
                Some(_) => error::ValidationSnafu {
                    message: format!("Option '{}' bound must be an integer.", key),
                }
                .fail(),
            }
        };

        let option = match opt_type.as_str() {
            "string" => {
                let default = value.unwrap_or_else(|| OptionArg::Str(String::new()));
                UserOption::build_checked_string(name, &description, &default)?
            }
            "boolean" => {
                let default = value.unwrap_or(OptionArg::Bool(true));
                let opt = UserOption::boolean(name, &description, true)?;
                let mut opt = opt;
                opt.set_value(&default)?;
                opt
            }
            "combo" => {
                let choices = choices.ok_or_else(|| {
                    error::ValidationSnafu {
                        message: "Combo option missing 'choices' keyword.",
                    }
                    .build()
                })?;
                let default = value
                    .or_else(|| choices.first().map(|c| OptionArg::Str(c.clone())))
                    .unwrap_or_else(|| OptionArg::Str(String::new()));
                UserOption::combo(name, &description, choices, &default)?
            }
            "integer" => {
                let default = value.ok_or_else(|| {
                    error::ValidationSnafu {
                        message: "Integer option must contain value argument.",
                    }
                    .build()
                })?;
                let min = int_bound(&mut kwargs, "min")?;
                let max = int_bound(&mut kwargs, "max")?;
                UserOption::integer(name, &description, min, max, &default)?
            }
            "array" => {
                let default = match value {
                    Some(v) => v,
                    None => match &choices {
                        Some(c) => OptionArg::List(
                            c.iter().map(|s| OptionArg::Str(s.clone())).collect(),
                        ),
                        None => OptionArg::List(Vec::new()),
                    },
                };
                UserOption::array(name, &description, choices, &default)?
            }
            "feature" => {
                let default = value.unwrap_or_else(|| OptionArg::Str("auto".to_string()));
                let opt = UserOption::feature(name, &description, "auto")?;
                let mut opt = opt;
                opt.set_value(&default)?;
                opt
            }
            _ => unreachable!("type validated above"),
        };
        Ok(option.yielding(yielding).deprecated(deprecated))
    }

    /// Warn about command-line options for this scope that no declaration
    /// matched. Sorted for deterministic output across platforms.
    fn check_for_bad_options(&self) {
        let mut bad = Vec::new();
        for option in self.cmd_line_options.keys() {
            if self.declared.contains(option) || is_reserved_option_name(option) {
                continue;
            }
            bad.push(option.clone());
        }
        if !bad.is_empty() {
            let scope = if self.subproject.is_empty() {
                String::new()
            } else {
                format!("In subproject {}: ", self.subproject)
            };
            warnings::warn(format!(
                "{}Unknown command line options: \"{}\"",
                scope,
                bad.join(", ")
            ));
        }
    }
}

impl UserOption {
    /// String options accept any string default, including the empty one.
    fn build_checked_string(name: &str, description: &str, default: &OptionArg) -> Result<Self> {
        match default {
            OptionArg::Str(s) => UserOption::string(name, description, s),
            other => error::ValidationSnafu {
                message: format!(
                    "The value of option \"{}\" is \"{}\", which is not a string.",
                    name,
                    match other {
                        OptionArg::Bool(b) => b.to_string(),
                        OptionArg::Int(i) => i.to_string(),
                        _ => "[...]".to_string(),
                    }
                ),
            }
            .fail(),
        }
    }
}

/// Reduce a literal node. Option files permit only strings, integers,
/// booleans and arrays of those.
fn reduce_single(node: &Node) -> Result<OptionArg> {
    match &node.kind {
        NodeKind::Str(s) => Ok(OptionArg::Str(s.clone())),
        NodeKind::Bool(b) => Ok(OptionArg::Bool(*b)),
        NodeKind::Num(n) => Ok(OptionArg::Int(*n)),
        NodeKind::Array(args) => {
            if !args.keyword.is_empty() {
                return error::ValidationSnafu {
                    message: "Keyword arguments are invalid in array construction.",
                }
                .fail();
            }
            let items: Vec<OptionArg> = args
                .positional
                .iter()
                .map(reduce_single)
                .collect::<Result<_>>()?;
            Ok(OptionArg::List(items))
        }
        _ => error::ValidationSnafu {
            message: "Arguments may only be string, int, bool, or array of those.",
        }
        .fail(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::options::OptionValue;
    use tempfile::TempDir;

    fn process(content: &str, subproject: &str, cmdline: &[&str]) -> (OptionStore, Option<Diagnostic>) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("meson_options.txt");
        fs::write(&path, content).unwrap();
        let mut store = OptionStore::new(false);
        crate::options::register_builtin_options(&mut store, None).unwrap();
        let cmdline: Vec<String> = cmdline.iter().map(|s| s.to_string()).collect();
        let err = {
            let mut oi = OptionInterpreter::new(&mut store, subproject, &cmdline).unwrap();
            oi.process(&path).err()
        };
        (store, err)
    }

    #[test]
    fn declares_combo_option_with_default() {
        let (store, err) = process(
            "option('level', type : 'combo', choices : ['a','b','c'], value : 'b')\n",
            "",
            &[],
        );
        assert!(err.is_none(), "{:?}", err);
        assert_eq!(
            store.get_value_for("level", Some("")).unwrap(),
            OptionValue::Str("b".to_string())
        );
    }

    #[test]
    fn command_line_overrides_default() {
        let (store, err) = process(
            "option('level', type : 'combo', choices : ['a','b','c'], value : 'b')\n",
            "",
            &["level=c"],
        );
        assert!(err.is_none(), "{:?}", err);
        assert_eq!(
            store.get_value_for("level", Some("")).unwrap(),
            OptionValue::Str("c".to_string())
        );
    }

    #[test]
    fn command_line_choice_violation_fails() {
        let (_, err) = process(
            "option('level', type : 'combo', choices : ['a','b','c'], value : 'b')\n",
            "",
            &["level=z"],
        );
        let err = err.expect("expected a failure");
        assert!(err.to_string().contains("not one of the choices"));
    }

    #[test]
    fn subproject_options_are_namespaced() {
        let (store, err) = process(
            "option('tls', type : 'boolean', value : false)\n",
            "net",
            &["net:tls=true"],
        );
        assert!(err.is_none(), "{:?}", err);
        assert_eq!(
            store.get_value_for("tls", Some("net")).unwrap(),
            OptionValue::Bool(true)
        );
    }

    #[test]
    fn foreign_subproject_options_are_ignored() {
        let (store, err) = process(
            "option('tls', type : 'boolean', value : false)\n",
            "net",
            &["other:tls=true"],
        );
        assert!(err.is_none(), "{:?}", err);
        assert_eq!(
            store.get_value_for("tls", Some("net")).unwrap(),
            OptionValue::Bool(false)
        );
    }

    #[test]
    fn reserved_names_are_rejected() {
        for source in [
            "option('c_args', type : 'string')\n",
            "option('backend', type : 'string')\n",
            "option('b_lto', type : 'boolean')\n",
        ] {
            let (_, err) = process(source, "", &[]);
            assert!(err.unwrap().to_string().contains("reserved"));
        }
    }

    #[test]
    fn bad_characters_in_name_are_rejected() {
        let (_, err) = process("option('my option', type : 'string')\n", "", &[]);
        assert!(err
            .unwrap()
            .to_string()
            .contains("letters, numbers or dashes"));
    }

    #[test]
    fn non_option_statements_are_rejected() {
        let (_, err) = process("x = 3\n", "", &[]);
        assert!(err.is_some());
        let (_, err) = process("project('nope')\n", "", &[]);
        assert!(err
            .unwrap()
            .to_string()
            .contains("Only calls to option()"));
    }

    #[test]
    fn unknown_kwarg_is_rejected() {
        let (_, err) = process("option('x', type : 'string', shiny : true)\n", "", &[]);
        assert!(err.unwrap().to_string().contains("Invalid kwargs"));
    }

    #[test]
    fn combo_without_choices_fails() {
        let (_, err) = process("option('x', type : 'combo', value : 'a')\n", "", &[]);
        assert!(err.unwrap().to_string().contains("choices"));
    }

    #[test]
    fn array_value_accepts_list_or_comma_string() {
        let (store, err) = process(
            "option('langs', type : 'array', value : ['en', 'fi'])\n",
            "",
            &["langs=en,de"],
        );
        assert!(err.is_none(), "{:?}", err);
        assert_eq!(
            store.get_value_for("langs", Some("")).unwrap(),
            OptionValue::Array(vec!["en".to_string(), "de".to_string()])
        );
    }

    #[test]
    fn integer_requires_value_and_honors_bounds() {
        let (_, err) = process("option('n', type : 'integer')\n", "", &[]);
        assert!(err.unwrap().to_string().contains("value argument"));
        let (_, err) = process(
            "option('n', type : 'integer', min : 1, max : 5, value : 9)\n",
            "",
            &[],
        );
        assert!(err.unwrap().to_string().contains("more than maximum"));
    }

    #[test]
    fn errors_carry_option_file_location() {
        let (_, err) = process("option('x', type : 'combo', value : 'a')\n", "", &[]);
        let err = err.unwrap();
        let loc = err.location.expect("expected a location");
        assert!(loc.file.ends_with("meson_options.txt"));
        assert_eq!(loc.line, 1);
    }
}
