use crate::translation::WorkItem;
use crate::utils::{BatchTranslatorError, Result};
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Split};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// One JSON object per line.
    JsonLines,
    /// A single pre-loaded JSON array of objects.
    JsonArray,
}

pub struct ItemReader {
    path: PathBuf,
}

impl ItemReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> Result<InputFormat> {
        let mut reader = BufReader::new(File::open(&self.path)?);
        let mut byte = [0u8; 1];
        loop {
            if reader.read(&mut byte)? == 0 {
                return Ok(InputFormat::JsonLines);
            }
            if !byte[0].is_ascii_whitespace() {
                return Ok(if byte[0] == b'[' {
                    InputFormat::JsonArray
                } else {
                    InputFormat::JsonLines
                });
            }
        }
    }

    pub fn count_items(&self) -> Result<usize> {
        match self.format()? {
            InputFormat::JsonArray => Ok(self.load_array()?.len()),
            InputFormat::JsonLines => {
                let mut count = 0;
                for line in self.raw_lines()? {
                    if !is_blank(&line?) {
                        count += 1;
                    }
                }
                Ok(count)
            }
        }
    }

    /// Records from `start` onwards; earlier records are skipped without decoding.
    pub fn iter_from(&self, start: usize) -> Result<ItemIterator> {
        let source = match self.format()? {
            InputFormat::JsonArray => {
                let mut values = self.load_array()?.into_iter();
                for _ in 0..start {
                    if values.next().is_none() {
                        break;
                    }
                }
                Source::Array(values)
            }
            InputFormat::JsonLines => {
                // Lines behind the checkpoint are counted, never decoded.
                let mut lines = self.raw_lines()?;
                let mut skipped = 0;
                while skipped < start {
                    match lines.next() {
                        Some(line) => {
                            if !is_blank(&line?) {
                                skipped += 1;
                            }
                        }
                        None => break,
                    }
                }
                Source::Lines(lines)
            }
        };

        Ok(ItemIterator {
            source,
            current_index: start,
        })
    }

    fn raw_lines(&self) -> Result<Split<BufReader<File>>> {
        Ok(BufReader::new(File::open(&self.path)?).split(b'\n'))
    }

    fn load_array(&self) -> Result<Vec<Value>> {
        let file = File::open(&self.path)?;
        let values: Vec<Value> = serde_json::from_reader(BufReader::new(file))?;
        Ok(values)
    }
}

enum Source {
    Lines(Split<BufReader<File>>),
    Array(std::vec::IntoIter<Value>),
}

pub struct ItemIterator {
    source: Source,
    current_index: usize,
}

impl ItemIterator {
    fn next_value(&mut self) -> Option<Result<std::result::Result<Value, String>>> {
        match &mut self.source {
            Source::Array(values) => values.next().map(|v| Ok(Ok(v))),
            Source::Lines(lines) => loop {
                match lines.next()? {
                    Ok(line) if is_blank(&line) => continue,
                    Ok(line) => return Some(Ok(decode_line(line))),
                    Err(e) => return Some(Err(e.into())),
                }
            },
        }
    }
}

impl Iterator for ItemIterator {
    type Item = Result<(usize, WorkItem)>;

    fn next(&mut self) -> Option<Self::Item> {
        let value = match self.next_value()? {
            Ok(value) => value,
            Err(e) => return Some(Err(e)),
        };

        let index = self.current_index;
        self.current_index += 1;

        let decoded = match value {
            Ok(Value::Object(map)) => Ok((index, WorkItem::from(map))),
            Ok(other) => Err(BatchTranslatorError::DecodeError {
                index,
                reason: format!("expected a JSON object, found {}", type_name(&other)),
            }),
            Err(reason) => Err(BatchTranslatorError::DecodeError { index, reason }),
        };
        Some(decoded)
    }
}

fn is_blank(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
}

fn decode_line(line: Vec<u8>) -> std::result::Result<Value, String> {
    let text = String::from_utf8(line).map_err(|e| format!("invalid UTF-8: {}", e))?;
    serde_json::from_str(&text).map_err(|e| e.to_string())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn indices(reader: &ItemReader, start: usize) -> Vec<usize> {
        reader
            .iter_from(start)
            .unwrap()
            .map(|r| r.unwrap().0)
            .collect()
    }

    #[test]
    fn reads_json_lines_skipping_blanks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.jsonl");
        fs::write(
            &path,
            "{\"instruction\": \"a\"}\n\n{\"instruction\": \"b\"}\n{\"instruction\": \"c\"}\n",
        )
        .unwrap();

        let reader = ItemReader::new(&path);
        assert_eq!(reader.format().unwrap(), InputFormat::JsonLines);
        assert_eq!(reader.count_items().unwrap(), 3);
        assert_eq!(indices(&reader, 0), vec![0, 1, 2]);

        let (index, item) = reader.iter_from(1).unwrap().next().unwrap().unwrap();
        assert_eq!(index, 1);
        assert_eq!(item.get_str("instruction"), Some("b"));
    }

    #[test]
    fn reads_json_array_from_offset() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.json");
        fs::write(&path, "  [{\"x\": \"1\"}, {\"x\": \"2\"}, {\"x\": \"3\"}]").unwrap();

        let reader = ItemReader::new(&path);
        assert_eq!(reader.format().unwrap(), InputFormat::JsonArray);
        assert_eq!(reader.count_items().unwrap(), 3);
        assert_eq!(indices(&reader, 2), vec![2]);
        assert!(indices(&reader, 10).is_empty());
    }

    #[test]
    fn bad_records_are_decode_errors_with_index() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.jsonl");
        fs::write(&path, "{\"x\": \"ok\"}\nnot json\n42\n{\"x\": \"ok\"}\n").unwrap();

        let results: Vec<_> = ItemReader::new(&path).iter_from(0).unwrap().collect();
        assert_eq!(results.len(), 4);
        assert!(results[0].is_ok());
        assert!(matches!(
            results[1],
            Err(BatchTranslatorError::DecodeError { index: 1, .. })
        ));
        assert!(matches!(
            results[2],
            Err(BatchTranslatorError::DecodeError { index: 2, .. })
        ));
        assert_eq!(results[3].as_ref().unwrap().0, 3);
    }

    #[test]
    fn invalid_utf8_line_is_a_decode_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.jsonl");
        let mut body = b"{\"x\": \"a\"}\n{\"x\": \"b\"}\n".to_vec();
        body.extend_from_slice(b"{\"x\": \"\xff\xfe\"}\n{\"x\": \"d\"}\n");
        fs::write(&path, body).unwrap();

        let reader = ItemReader::new(&path);
        assert_eq!(reader.count_items().unwrap(), 4);

        let results: Vec<_> = reader.iter_from(0).unwrap().collect();
        assert!(matches!(
            results[2],
            Err(BatchTranslatorError::DecodeError { index: 2, .. })
        ));
        assert_eq!(results[3].as_ref().unwrap().0, 3);

        // Resuming past the bad line never decodes it.
        assert_eq!(indices(&reader, 3), vec![3]);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = ItemReader::new("/nonexistent/data.json").iter_from(0).err().unwrap();
        assert!(matches!(err, BatchTranslatorError::IoError(_)));
    }
}
