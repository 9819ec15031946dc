/*!
The on-disk format for test and benchmark serialisations: a versioned,
length-prefixed binary layout written and read only by this codebase.
Strings are u32-length-prefixed UTF-8, lists are u32-counted, booleans a
single byte, integers little-endian i64.

*/
use std::io::{self, Read, Write};

const MAGIC: &[u8; 4] = b"MSNT";
const FORMAT_VERSION: u32 = 1;

/// A test as handed to the runner: fully resolved command lines, no
/// graph references left.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TestSerialisation {
    pub name: String,
    pub project: String,
    pub command: Vec<String>,
    pub is_cross: bool,
    pub exe_wrapper: Option<String>,
    pub is_parallel: bool,
    pub cmd_args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub should_fail: bool,
    pub timeout: i64,
    pub valgrind_args: Vec<String>,
}

fn write_u32<W: Write>(w: &mut W, value: u32) -> io::Result<()> {
    w.write_all(&value.to_le_bytes())
}

fn write_i64<W: Write>(w: &mut W, value: i64) -> io::Result<()> {
    w.write_all(&value.to_le_bytes())
}

fn write_bool<W: Write>(w: &mut W, value: bool) -> io::Result<()> {
    w.write_all(&[u8::from(value)])
}

fn write_str<W: Write>(w: &mut W, value: &str) -> io::Result<()> {
    write_u32(w, value.len() as u32)?;
    w.write_all(value.as_bytes())
}

fn write_list<W: Write>(w: &mut W, values: &[String]) -> io::Result<()> {
    write_u32(w, values.len() as u32)?;
    for value in values {
        write_str(w, value)?;
    }
    Ok(())
}

fn read_u32<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_i64<R: Read>(r: &mut R) -> io::Result<i64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

fn read_bool<R: Read>(r: &mut R) -> io::Result<bool> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0] != 0)
}

fn bad_data(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

fn read_str<R: Read>(r: &mut R) -> io::Result<String> {
    let len = read_u32(r)? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|_| bad_data("string field is not UTF-8"))
}

fn read_list<R: Read>(r: &mut R) -> io::Result<Vec<String>> {
    let count = read_u32(r)? as usize;
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        values.push(read_str(r)?);
    }
    Ok(values)
}

impl TestSerialisation {
    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        write_str(w, &self.name)?;
        write_str(w, &self.project)?;
        write_list(w, &self.command)?;
        write_bool(w, self.is_cross)?;
        match &self.exe_wrapper {
            Some(wrapper) => {
                write_bool(w, true)?;
                write_str(w, wrapper)?;
            }
            None => write_bool(w, false)?,
        }
        write_bool(w, self.is_parallel)?;
        write_list(w, &self.cmd_args)?;
        write_u32(w, self.env.len() as u32)?;
        for (key, value) in &self.env {
            write_str(w, key)?;
            write_str(w, value)?;
        }
        write_bool(w, self.should_fail)?;
        write_i64(w, self.timeout)?;
        write_list(w, &self.valgrind_args)
    }

    fn read_from<R: Read>(r: &mut R) -> io::Result<TestSerialisation> {
        let name = read_str(r)?;
        let project = read_str(r)?;
        let command = read_list(r)?;
        let is_cross = read_bool(r)?;
        let exe_wrapper = if read_bool(r)? {
            Some(read_str(r)?)
        } else {
            None
        };
        let is_parallel = read_bool(r)?;
        let cmd_args = read_list(r)?;
        let env_count = read_u32(r)? as usize;
        let mut env = Vec::with_capacity(env_count);
        for _ in 0..env_count {
            let key = read_str(r)?;
            let value = read_str(r)?;
            env.push((key, value));
        }
        let should_fail = read_bool(r)?;
        let timeout = read_i64(r)?;
        let valgrind_args = read_list(r)?;
        Ok(TestSerialisation {
            name,
            project,
            command,
            is_cross,
            exe_wrapper,
            is_parallel,
            cmd_args,
            env,
            should_fail,
            timeout,
            valgrind_args,
        })
    }
}

pub fn write_test_file<W: Write>(w: &mut W, tests: &[TestSerialisation]) -> io::Result<()> {
    w.write_all(MAGIC)?;
    write_u32(w, FORMAT_VERSION)?;
    write_u32(w, tests.len() as u32)?;
    for test in tests {
        test.write_to(w)?;
    }
    Ok(())
}

pub fn read_test_file<R: Read>(r: &mut R) -> io::Result<Vec<TestSerialisation>> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(bad_data("not a test serialisation file"));
    }
    let version = read_u32(r)?;
    if version != FORMAT_VERSION {
        return Err(bad_data("unsupported test serialisation version"));
    }
    let count = read_u32(r)? as usize;
    let mut tests = Vec::with_capacity(count);
    for _ in 0..count {
        tests.push(TestSerialisation::read_from(r)?);
    }
    Ok(tests)
}
