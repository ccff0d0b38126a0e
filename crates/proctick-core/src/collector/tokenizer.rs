//! Byte-level tokenizer for `/proc` text lines.
//!
//! Everything here works on borrowed slices of the line buffer owned by
//! [`ProcFile`](crate::collector::source::ProcFile): no intermediate
//! `String`, no `str::parse`. Numbers are accumulated digit by digit.

use memchr::memchr;

use crate::collector::error::{NumError, ParseError};

#[inline]
fn is_blank(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

/// Strips a trailing `\n` (and `\r` before it, if any).
pub fn strip_terminator(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Trims spaces and tabs on both sides.
pub fn trim_blanks(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| !is_blank(b)).unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|&b| !is_blank(b)).map_or(start, |i| i + 1);
    &bytes[start..end]
}

/// How the label is separated from the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Separator {
    /// `name: value` (meminfo, net/dev, cpuinfo).
    Colon,
    /// `name value` (stat, vmstat).
    Whitespace,
}

/// Splits a line into `(name, value)`.
///
/// Blanks around both parts and the line terminator are removed. Returns
/// `None` when the line has no separator; such lines are skipped by callers.
pub fn split_key_value(line: &[u8], sep: Separator) -> Option<(&[u8], &[u8])> {
    let line = strip_terminator(line);
    let start = line.iter().position(|&b| !is_blank(b))?;
    let line = &line[start..];

    let pos = match sep {
        Separator::Colon => memchr(b':', line)?,
        Separator::Whitespace => line.iter().position(|&b| is_blank(b))?,
    };

    Some((trim_blanks(&line[..pos]), trim_blanks(&line[pos + 1..])))
}

/// Iterator over whitespace-delimited tokens of a line.
#[derive(Debug, Clone)]
pub struct Fields<'a> {
    rest: &'a [u8],
}

/// Tokenizes `bytes`, ignoring a trailing line terminator.
pub fn fields(bytes: &[u8]) -> Fields<'_> {
    Fields {
        rest: strip_terminator(bytes),
    }
}

impl<'a> Iterator for Fields<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        let start = self.rest.iter().position(|&b| !is_blank(b))?;
        let rest = &self.rest[start..];
        let end = rest.iter().position(|&b| is_blank(b)).unwrap_or(rest.len());
        self.rest = &rest[end..];
        Some(&rest[..end])
    }
}

/// Parses an unsigned decimal integer.
pub fn parse_u64(bytes: &[u8]) -> Result<u64, NumError> {
    if bytes.is_empty() {
        return Err(NumError::Empty);
    }

    let mut acc: u64 = 0;
    for &b in bytes {
        let digit = b.wrapping_sub(b'0');
        if digit > 9 {
            return Err(NumError::InvalidDigit);
        }
        acc = acc
            .checked_mul(10)
            .and_then(|v| v.checked_add(u64::from(digit)))
            .ok_or(NumError::Overflow)?;
    }
    Ok(acc)
}

/// Parses a signed decimal integer with an optional `+`/`-` sign.
pub fn parse_i64(bytes: &[u8]) -> Result<i64, NumError> {
    let (negative, digits) = match bytes.split_first() {
        Some((b'-', rest)) => (true, rest),
        Some((b'+', rest)) => (false, rest),
        _ => (false, bytes),
    };

    let magnitude = parse_u64(digits)?;
    if negative {
        if magnitude > i64::MAX as u64 + 1 {
            return Err(NumError::Overflow);
        }
        Ok((magnitude as i64).wrapping_neg())
    } else {
        i64::try_from(magnitude).map_err(|_| NumError::Overflow)
    }
}

/// Maximum number of fractional digits that contribute to a float.
const MAX_FRACTION_DIGITS: i32 = 18;

/// Parses a plain decimal float (`12`, `-0.5`, `1992.000`). No exponent.
pub fn parse_f64(bytes: &[u8]) -> Result<f64, NumError> {
    let (negative, body) = match bytes.split_first() {
        Some((b'-', rest)) => (true, rest),
        Some((b'+', rest)) => (false, rest),
        _ => (false, bytes),
    };

    let (int_part, frac_part) = match memchr(b'.', body) {
        Some(dot) => (&body[..dot], &body[dot + 1..]),
        None => (body, &body[body.len()..]),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(NumError::Empty);
    }

    let mut value = 0f64;
    for &b in int_part {
        let digit = b.wrapping_sub(b'0');
        if digit > 9 {
            return Err(NumError::InvalidDigit);
        }
        value = value * 10.0 + f64::from(digit);
    }

    let mut fraction: u64 = 0;
    let mut scale = 0;
    for &b in frac_part {
        let digit = b.wrapping_sub(b'0');
        if digit > 9 {
            return Err(NumError::InvalidDigit);
        }
        if scale < MAX_FRACTION_DIGITS {
            fraction = fraction * 10 + u64::from(digit);
            scale += 1;
        }
    }
    value += fraction as f64 / 10f64.powi(scale);

    Ok(if negative { -value } else { value })
}

/// What to do when a counter or gauge field fails to convert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParsePolicy {
    /// Store zero and keep the error as a diagnostic.
    #[default]
    Lenient,
    /// Abort the whole record.
    Strict,
}

/// Policy-aware field conversion.
///
/// Domains route every value field through this so the sampler applies one
/// policy uniformly. Errors recovered under [`ParsePolicy::Lenient`] are kept
/// until the sampler drains them.
#[derive(Debug, Default)]
pub struct FieldParser {
    policy: ParsePolicy,
    diagnostics: Vec<ParseError>,
}

impl FieldParser {
    pub fn new(policy: ParsePolicy) -> Self {
        Self {
            policy,
            diagnostics: Vec::new(),
        }
    }

    pub fn policy(&self) -> ParsePolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: ParsePolicy) {
        self.policy = policy;
    }

    pub fn u64(&mut self, field: &str, bytes: &[u8]) -> Result<u64, ParseError> {
        self.convert(field, parse_u64(bytes))
    }

    pub fn f64(&mut self, field: &str, bytes: &[u8]) -> Result<f64, ParseError> {
        self.convert(field, parse_f64(bytes))
    }

    /// Parses the first token of `value` (`"16384000 kB"` -> 16384000).
    pub fn leading_u64(&mut self, field: &str, value: &[u8]) -> Result<u64, ParseError> {
        let token = fields(value).next().unwrap_or_default();
        self.u64(field, token)
    }

    fn convert<T: Default>(
        &mut self,
        field: &str,
        result: Result<T, NumError>,
    ) -> Result<T, ParseError> {
        match result {
            Ok(v) => Ok(v),
            Err(kind) => {
                let err = ParseError::new(field, kind);
                match self.policy {
                    ParsePolicy::Strict => Err(err),
                    ParsePolicy::Lenient => {
                        self.diagnostics.push(err);
                        Ok(T::default())
                    }
                }
            }
        }
    }

    pub fn diagnostics(&self) -> &[ParseError] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<ParseError> {
        std::mem::take(&mut self.diagnostics)
    }

    pub fn clear(&mut self) {
        self.diagnostics.clear();
    }
}

/// Positional numeric columns, assigned in declared field order.
///
/// Columns missing at the end of the line read as zero; older kernels
/// expose fewer columns than newer ones.
#[derive(Debug, Clone)]
pub struct Columns<'a> {
    fields: Fields<'a>,
}

impl<'a> Columns<'a> {
    pub fn new(value: &'a [u8]) -> Self {
        Self {
            fields: fields(value),
        }
    }

    pub fn next_u64(&mut self, parser: &mut FieldParser, field: &str) -> Result<u64, ParseError> {
        match self.fields.next() {
            Some(token) => parser.u64(field, token),
            None => Ok(0),
        }
    }

    pub fn next_f64(&mut self, parser: &mut FieldParser, field: &str) -> Result<f64, ParseError> {
        match self.fields.next() {
            Some(token) => parser.f64(field, token),
            None => Ok(0.0),
        }
    }

    /// Raw next token, for columns that need custom handling.
    pub fn next_token(&mut self) -> Option<&'a [u8]> {
        self.fields.next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_colon_trims_both_sides() {
        let (name, value) = split_key_value(b"name:   123\n", Separator::Colon).unwrap();
        assert_eq!(name, b"name");
        assert_eq!(value, b"123");
    }

    #[test]
    fn test_split_colon_with_tabs_and_spaces_in_name() {
        let (name, value) =
            split_key_value(b"cpu family\t: 6  \n", Separator::Colon).unwrap();
        assert_eq!(name, b"cpu family");
        assert_eq!(value, b"6");
    }

    #[test]
    fn test_split_colon_leading_blanks() {
        let (name, value) =
            split_key_value(b"  eth0: 9876 5678\n", Separator::Colon).unwrap();
        assert_eq!(name, b"eth0");
        assert_eq!(value, b"9876 5678");
    }

    #[test]
    fn test_split_whitespace() {
        let (name, value) = split_key_value(b"pgpgin   123456\n", Separator::Whitespace).unwrap();
        assert_eq!(name, b"pgpgin");
        assert_eq!(value, b"123456");
    }

    #[test]
    fn test_split_without_separator_is_skipped() {
        assert!(split_key_value(b"Inter-|   Receive\n", Separator::Colon).is_none());
        assert!(split_key_value(b"lonely\n", Separator::Whitespace).is_none());
        assert!(split_key_value(b"\n", Separator::Colon).is_none());
    }

    #[test]
    fn test_empty_value() {
        let (name, value) = split_key_value(b"flags\t:\n", Separator::Colon).unwrap();
        assert_eq!(name, b"flags");
        assert!(value.is_empty());
    }

    #[test]
    fn test_fields_skip_runs_of_blanks() {
        let tokens: Vec<&[u8]> = fields(b"  10  20\t30 \n").collect();
        assert_eq!(tokens, vec![&b"10"[..], &b"20"[..], &b"30"[..]]);
        assert_eq!(fields(b"   \n").count(), 0);
    }

    #[test]
    fn test_parse_u64() {
        assert_eq!(parse_u64(b"0"), Ok(0));
        assert_eq!(parse_u64(b"18446744073709551615"), Ok(u64::MAX));
        assert_eq!(parse_u64(b"18446744073709551616"), Err(NumError::Overflow));
        assert_eq!(parse_u64(b""), Err(NumError::Empty));
        assert_eq!(parse_u64(b"12a"), Err(NumError::InvalidDigit));
        assert_eq!(parse_u64(b"-1"), Err(NumError::InvalidDigit));
    }

    #[test]
    fn test_parse_i64() {
        assert_eq!(parse_i64(b"-42"), Ok(-42));
        assert_eq!(parse_i64(b"+7"), Ok(7));
        assert_eq!(parse_i64(b"-9223372036854775808"), Ok(i64::MIN));
        assert_eq!(parse_i64(b"9223372036854775808"), Err(NumError::Overflow));
        assert_eq!(parse_i64(b"-"), Err(NumError::Empty));
    }

    #[test]
    fn test_parse_f64() {
        assert!((parse_f64(b"0.15").unwrap() - 0.15).abs() < 1e-12);
        assert!((parse_f64(b"1992.000").unwrap() - 1992.0).abs() < 1e-12);
        assert!((parse_f64(b"-2.5").unwrap() + 2.5).abs() < 1e-12);
        assert_eq!(parse_f64(b"3"), Ok(3.0));
        assert_eq!(parse_f64(b"."), Err(NumError::Empty));
        assert_eq!(parse_f64(b"1e5"), Err(NumError::InvalidDigit));
    }

    #[test]
    fn test_lenient_parser_defaults_to_zero() {
        let mut parser = FieldParser::new(ParsePolicy::Lenient);
        assert_eq!(parser.u64("rx_bytes", b"garbage"), Ok(0));
        assert_eq!(parser.diagnostics().len(), 1);
        assert_eq!(parser.diagnostics()[0].field, "rx_bytes");

        let taken = parser.take_diagnostics();
        assert_eq!(taken.len(), 1);
        assert!(parser.diagnostics().is_empty());
    }

    #[test]
    fn test_strict_parser_aborts() {
        let mut parser = FieldParser::new(ParsePolicy::Strict);
        let err = parser.u64("ctxt", b"x").unwrap_err();
        assert_eq!(err, ParseError::new("ctxt", NumError::InvalidDigit));
        assert!(parser.diagnostics().is_empty());
    }

    #[test]
    fn test_leading_u64() {
        let mut parser = FieldParser::default();
        assert_eq!(parser.leading_u64("MemTotal", b"16384000 kB"), Ok(16384000));
    }

    #[test]
    fn test_columns_missing_tail_reads_zero() {
        let mut parser = FieldParser::default();
        let mut cols = Columns::new(b"1 2\n");
        assert_eq!(cols.next_u64(&mut parser, "a"), Ok(1));
        assert_eq!(cols.next_u64(&mut parser, "b"), Ok(2));
        assert_eq!(cols.next_u64(&mut parser, "c"), Ok(0));
        assert!(parser.diagnostics().is_empty());
    }
}
