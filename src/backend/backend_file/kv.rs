use std::collections::BTreeMap;
use std::io::{self, BufRead, BufReader, Read, Write};

use log::error;

use super::FindError;

pub type KeyValues = BTreeMap<String, String>;

pub fn read(input: impl Read) -> Result<KeyValues, FindError> {
    let mut kv = BTreeMap::new();

    for line in BufReader::new(input).lines() {
        let line = line.map_err(|e| {
            error!("couldn't read line: {e}");
            FindError::Internal
        })?;

        if line.is_empty() {
            continue;
        }

        let (k, v) = line.split_once(':').ok_or_else(|| {
            error!("invalid line, can't split");
            FindError::Internal
        })?;

        let Some(v) = v.strip_prefix(' ') else {
            error!("invalid line - no whitespace after colon");
            return Err(FindError::Internal);
        };
        kv.insert(k.into(), v.into());
    }

    Ok(kv)
}

/// One record per line, so a key or value that would break the line is refused
/// before anything is written.
pub fn write(mut output: impl Write, keyvalues: &KeyValues) -> Result<(), io::Error> {
    let breaks_line = |s: &String| s.contains(['\n', '\r']);

    if let Some((k, _)) = keyvalues
        .iter()
        .find(|(k, v)| breaks_line(k) || k.contains(':') || breaks_line(v))
    {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("unwritable entry for \"{k}\""),
        ));
    }

    for (k, v) in keyvalues {
        writeln!(output, "{}: {}", k, v)?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reads_lines() {
        let kv = read("id: 4\nrole: admin\nemail: \n\npwhash: $2b$04$a:b\n".as_bytes()).unwrap();

        assert_eq!(kv["id"], "4");
        assert_eq!(kv["role"], "admin");
        assert_eq!(kv["email"], "");
        assert_eq!(kv["pwhash"], "$2b$04$a:b");
    }

    #[test]
    fn rejects_bad_lines() {
        assert!(matches!(read("id 4\n".as_bytes()), Err(FindError::Internal)));
        assert!(matches!(read("id:4\n".as_bytes()), Err(FindError::Internal)));
    }

    #[test]
    fn write_is_ordered() {
        let mut kv = KeyValues::new();
        kv.insert("role".into(), "user".into());
        kv.insert("id".into(), "1".into());

        let mut out = vec![];
        write(&mut out, &kv).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "id: 1\nrole: user\n");
    }

    #[test]
    fn write_refuses_line_breaks() {
        for (k, v) in [("email", "x\ny"), ("email", "x\r"), ("em\nail", "x"), ("a:b", "x")] {
            let mut kv = KeyValues::new();
            kv.insert("id".into(), "1".into());
            kv.insert(k.into(), v.into());

            let mut out = vec![];
            let err = write(&mut out, &kv).unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
            assert!(out.is_empty(), "{k:?} partially written");
        }
    }
}
