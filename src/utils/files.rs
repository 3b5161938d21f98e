//! UTF-8 text files, e.g. `.md`, `.txt` or source files holding prompt templates.
//!
//! Errors are plain [std::io::Error]s, including invalid UTF-8 which surfaces as [std::io::ErrorKind::InvalidData].

use std::fs;
use std::io;
use std::path::Path;

/// Read the whole file as UTF-8.
pub fn read_utf8_file(path: impl AsRef<Path>) -> io::Result<String> {
    fs::read_to_string(path)
}

/// Write `content` as UTF-8, replacing the file if it exists.
pub fn write_utf8_file(path: impl AsRef<Path>, content: impl AsRef<str>) -> io::Result<()> {
    fs::write(path, content.as_ref().as_bytes())
}

#[cfg(test)]
mod test_files {
    use std::io::ErrorKind;
    use tempfile::TempDir;
    use super::{read_utf8_file, write_utf8_file};
    use crate::agent::AgentConfig;
    use crate::prompt::PromptTemplate;

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("roundtrip.md");
        write_utf8_file(&path, "# Überschrift\n{[topic_block]}").unwrap();
        assert_eq!("# Überschrift\n{[topic_block]}", read_utf8_file(&path).unwrap());

        let template = PromptTemplate::from_file(&path).unwrap();
        assert!(template.placeholders.contains("topic_block"));
    }

    #[test]
    fn test_agent_config_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("agent.json");
        write_utf8_file(&path, r#"{"role": "expert scientific researcher", "algorithm": ["Analyze topic_block"]}"#).unwrap();
        let config = AgentConfig::from_json_file(&path).unwrap();
        assert_eq!(Some("expert scientific researcher"), config.role.as_deref());
        assert_eq!(vec!["Analyze topic_block".to_string()], config.algorithm);
        assert!(AgentConfig::from_json_file(dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_invalid_utf8_is_io_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("latin1.txt");
        std::fs::write(&path, [0x66u8, 0x6f, 0xff, 0xfe]).unwrap();
        let err = read_utf8_file(&path).expect_err("bytes are not valid UTF-8");
        assert_eq!(ErrorKind::InvalidData, err.kind());
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = read_utf8_file(dir.path().join("does-not-exist.txt")).expect_err("file does not exist");
        assert_eq!(ErrorKind::NotFound, err.kind());
    }
}
