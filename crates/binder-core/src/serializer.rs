//! Reassembles a `ParseResult`'s line buffer into bytes. For a freshly parsed,
//! unmutated result this is byte-identical to the original input (spec invariant 1).

use crate::model::ParseResult;

const BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

pub fn serialize(result: &ParseResult) -> Vec<u8> {
    let mut out = Vec::new();
    if result.had_bom {
        out.extend_from_slice(BOM);
    }
    for (line, ending) in result.lines.iter().zip(result.endings.iter()) {
        out.extend_from_slice(line.as_bytes());
        out.extend_from_slice(ending.as_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use pretty_assertions::assert_eq;

    #[test]
    fn round_trips_byte_identically() {
        let inputs: &[&[u8]] = &[
            b"<!-- prosemark-binder:v1 -->\n\n- [Chapter One](chapter-one.md)\n",
            b"no pragma here\r\njust text\r\n",
            b"",
            b"- [[stem]]\n  continuation\n",
        ];
        for input in inputs {
            let (result, _diags) = parse(input, None).unwrap();
            assert_eq!(serialize(&result), input.to_vec());
        }
    }
}
