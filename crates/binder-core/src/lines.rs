//! Splits source bytes into parallel line-text / line-ending sequences.
//!
//! Grounded on the teacher's `parsing/rope/lines.rs` (`LineRef`/`lines_with_spans`),
//! reworked from a rope-backed iterator into an eager `Vec<String>` split because
//! operations need random-access splicing, not streaming.

use crate::error::CoreError;

const BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

pub struct Split {
    pub lines: Vec<String>,
    pub endings: Vec<String>,
    pub had_bom: bool,
}

/// Split `bytes` into lines, recognizing `\n`, `\r\n`, and bare `\r` as endings.
/// The last line's ending is `""` when the source has no trailing terminator.
/// An empty source produces empty `lines`/`endings`.
pub fn split_lines(bytes: &[u8]) -> Result<Split, CoreError> {
    let had_bom = bytes.starts_with(BOM);
    let body = if had_bom { &bytes[BOM.len()..] } else { bytes };

    let text = std::str::from_utf8(body).map_err(CoreError::from_utf8_error)?;

    let mut lines = Vec::new();
    let mut endings = Vec::new();

    if text.is_empty() {
        return Ok(Split {
            lines,
            endings,
            had_bom,
        });
    }

    let bytes = text.as_bytes();
    let mut start = 0usize;
    let mut i = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'\n' => {
                lines.push(text[start..i].to_string());
                endings.push("\n".to_string());
                i += 1;
                start = i;
            }
            b'\r' => {
                if i + 1 < bytes.len() && bytes[i + 1] == b'\n' {
                    lines.push(text[start..i].to_string());
                    endings.push("\r\n".to_string());
                    i += 2;
                } else {
                    lines.push(text[start..i].to_string());
                    endings.push("\r".to_string());
                    i += 1;
                }
                start = i;
            }
            _ => i += 1,
        }
    }
    if start < bytes.len() {
        lines.push(text[start..].to_string());
        endings.push(String::new());
    }

    Ok(Split {
        lines,
        endings,
        had_bom,
    })
}

/// The ending used for newly inserted lines: the majority ending among existing
/// lines, ties broken toward LF.
pub fn majority_ending(endings: &[String]) -> String {
    let mut lf = 0usize;
    let mut crlf = 0usize;
    let mut cr = 0usize;
    for e in endings {
        match e.as_str() {
            "\n" => lf += 1,
            "\r\n" => crlf += 1,
            "\r" => cr += 1,
            _ => {}
        }
    }
    if crlf > lf && crlf > cr {
        "\r\n".to_string()
    } else if cr > lf && cr > crlf {
        "\r".to_string()
    } else {
        "\n".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn splits_on_lf() {
        let s = split_lines(b"a\nb\nc").unwrap();
        assert_eq!(s.lines, vec!["a", "b", "c"]);
        assert_eq!(s.endings, vec!["\n", "\n", ""]);
    }

    #[test]
    fn splits_on_crlf() {
        let s = split_lines(b"a\r\nb\r\n").unwrap();
        assert_eq!(s.lines, vec!["a", "b"]);
        assert_eq!(s.endings, vec!["\r\n", "\r\n"]);
    }

    #[test]
    fn splits_on_bare_cr() {
        let s = split_lines(b"a\rb\r").unwrap();
        assert_eq!(s.lines, vec!["a", "b"]);
        assert_eq!(s.endings, vec!["\r", "\r"]);
    }

    #[test]
    fn empty_input_produces_no_lines() {
        let s = split_lines(b"").unwrap();
        assert!(s.lines.is_empty());
        assert!(s.endings.is_empty());
        assert!(!s.had_bom);
    }

    #[test]
    fn detects_and_strips_bom() {
        let mut bytes = BOM.to_vec();
        bytes.extend_from_slice(b"hello\n");
        let s = split_lines(&bytes).unwrap();
        assert!(s.had_bom);
        assert_eq!(s.lines, vec!["hello"]);
    }

    #[test]
    fn invalid_utf8_is_fatal() {
        let bytes = vec![0xFF, 0xFE];
        assert!(split_lines(&bytes).is_err());
    }

    #[test]
    fn majority_ending_prefers_lf_on_tie() {
        let endings = vec!["\r\n".to_string(), "\n".to_string()];
        assert_eq!(majority_ending(&endings), "\n");
    }

    #[test]
    fn majority_ending_picks_crlf_when_dominant() {
        let endings = vec!["\r\n".to_string(), "\r\n".to_string(), "\n".to_string()];
        assert_eq!(majority_ending(&endings), "\r\n");
    }
}
