//! Cell value formatting.

use std::sync::Arc;

use dashmap::DashMap;
use rolap_common::CellValue;

/// Renders a cell value as the `FORMATTED_VALUE` property.
pub trait ValueFormatter: Send + Sync {
    fn format(&self, value: &CellValue) -> String;
}

/// Minimal number-format-string interpreter.
///
/// Understands the named formats `Standard`, `Fixed`, `Percent`, `Currency`
/// and `General Number`, plus patterns built from `#`, `0`, `,` and `.` with
/// a literal prefix and suffix (`%` in the suffix scales by 100).
#[derive(Debug, Clone, PartialEq)]
pub struct FormatStringFormatter {
    general: bool,
    prefix: String,
    suffix: String,
    min_int: usize,
    min_frac: usize,
    max_frac: usize,
    grouping: bool,
    percent: bool,
    decimal_sep: char,
    group_sep: Option<char>,
}

fn separators(locale: &str) -> (char, Option<char>) {
    let lang = locale
        .split(['-', '_'])
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();
    match lang.as_str() {
        "de" | "es" | "it" | "nl" | "pt" | "da" | "id" | "tr" => (',', Some('.')),
        "fr" | "ru" | "pl" | "cs" | "sv" | "fi" | "nb" => (',', Some('\u{a0}')),
        _ => ('.', Some(',')),
    }
}

impl FormatStringFormatter {
    pub fn new(format: &str, locale: &str) -> Self {
        let pattern = match format.trim() {
            "Standard" => "#,##0.00",
            "Fixed" => "0.00",
            "Percent" => "0.00%",
            "Currency" => "$#,##0.00",
            other => other,
        };
        let (decimal_sep, group_sep) = separators(locale);
        let mut out = Self {
            general: false,
            prefix: String::new(),
            suffix: String::new(),
            min_int: 1,
            min_frac: 0,
            max_frac: 0,
            grouping: false,
            percent: false,
            decimal_sep,
            group_sep,
        };

        let is_num = |c: char| matches!(c, '#' | '0' | ',' | '.');
        let Some(start) = pattern.find(is_num) else {
            out.general = true;
            return out;
        };
        let end = pattern[start..]
            .find(|c: char| !is_num(c))
            .map_or(pattern.len(), |i| start + i);
        out.prefix = pattern[..start].to_string();
        out.suffix = pattern[end..].to_string();
        out.percent = out.suffix.contains('%') || out.prefix.contains('%');

        let numeric = &pattern[start..end];
        let (int_part, frac_part) = numeric.split_once('.').unwrap_or((numeric, ""));
        out.grouping = int_part.contains(',');
        out.min_int = int_part.chars().filter(|&c| c == '0').count();
        out.min_frac = frac_part.chars().filter(|&c| c == '0').count();
        out.max_frac = frac_part.chars().filter(|&c| c == '0' || c == '#').count();
        out
    }

    fn format_number(&self, n: f64) -> String {
        let n = if self.percent { n * 100.0 } else { n };
        let mut digits = format!("{:.*}", self.max_frac, n.abs());
        if let Some(dot) = digits.find('.') {
            let keep = dot + 1 + self.min_frac;
            while digits.len() > keep && digits.ends_with('0') {
                digits.pop();
            }
            if digits.ends_with('.') {
                digits.pop();
            }
        }
        let (int_digits, frac_digits) = digits.split_once('.').unwrap_or((digits.as_str(), ""));

        let mut int_out = String::new();
        if !(self.min_int == 0 && int_digits == "0") {
            let padded = format!("{:0>width$}", int_digits, width = self.min_int);
            let len = padded.len();
            for (i, c) in padded.chars().enumerate() {
                if i > 0
                    && self.grouping
                    && (len - i) % 3 == 0
                    && let Some(sep) = self.group_sep
                {
                    int_out.push(sep);
                }
                int_out.push(c);
            }
        }

        let negative = n < 0.0 && digits.chars().any(|c| c.is_ascii_digit() && c != '0');
        let mut s = String::new();
        if negative {
            s.push('-');
        }
        s.push_str(&self.prefix);
        s.push_str(&int_out);
        if !frac_digits.is_empty() {
            s.push(self.decimal_sep);
            s.push_str(frac_digits);
        }
        s.push_str(&self.suffix);
        s
    }
}

impl ValueFormatter for FormatStringFormatter {
    fn format(&self, value: &CellValue) -> String {
        match value {
            CellValue::Null | CellValue::Pending => String::new(),
            CellValue::Text(s) => s.clone(),
            CellValue::Error(e) => e.kind.to_string(),
            CellValue::Boolean(_) | CellValue::Int(_) | CellValue::Number(_) if self.general => {
                value.to_string()
            }
            other => match other.as_f64() {
                Some(n) => self.format_number(n),
                None => other.to_string(),
            },
        }
    }
}

/// Shared formatter lookup keyed by `(locale, format string)`; parses on
/// first use.
#[derive(Default)]
pub struct FormatterCache {
    formatters: DashMap<(String, String), Arc<dyn ValueFormatter>>,
}

impl std::fmt::Debug for FormatterCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatterCache")
            .field("entries", &self.formatters.len())
            .finish()
    }
}

impl FormatterCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, locale: &str, format: &str) -> Arc<dyn ValueFormatter> {
        let key = (locale.to_string(), format.to_string());
        if let Some(f) = self.formatters.get(&key) {
            return f.value().clone();
        }
        self.formatters
            .entry(key)
            .or_insert_with(|| Arc::new(FormatStringFormatter::new(format, locale)))
            .value()
            .clone()
    }

    /// Register a custom formatter for a format string.
    pub fn register(&self, locale: &str, format: &str, formatter: Arc<dyn ValueFormatter>) {
        self.formatters
            .insert((locale.to_string(), format.to_string()), formatter);
    }

    pub fn len(&self) -> usize {
        self.formatters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formatters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(pattern: &str, v: impl Into<CellValue>) -> String {
        FormatStringFormatter::new(pattern, "en").format(&v.into())
    }

    #[test]
    fn grouping_and_decimals() {
        assert_eq!(fmt("#,##0", 1234567.4), "1,234,567");
        assert_eq!(fmt("#,##0.00", 1234.5), "1,234.50");
        assert_eq!(fmt("0.00", 3i64), "3.00");
        assert_eq!(fmt("#,##0.##", 2.5), "2.5");
        assert_eq!(fmt("Standard", -1234.567), "-1,234.57");
    }

    #[test]
    fn prefix_suffix_and_percent() {
        assert_eq!(fmt("Currency", 12.0), "$12.00");
        assert_eq!(fmt("Percent", 0.256), "25.60%");
        assert_eq!(fmt("0 units", 7i64), "7 units");
    }

    #[test]
    fn non_numeric_values() {
        assert_eq!(fmt("#,##0", CellValue::Null), "");
        assert_eq!(fmt("#,##0", "abc"), "abc");
        assert_eq!(fmt("General Number", 2.5), "2.5");
    }

    #[test]
    fn locale_separators() {
        let f = FormatStringFormatter::new("#,##0.00", "de-DE");
        assert_eq!(f.format(&CellValue::Number(1234.5)), "1.234,50");
    }

    #[test]
    fn cache_reuses_parsed_formatters() {
        let cache = FormatterCache::new();
        let a = cache.get("en", "#,##0");
        let b = cache.get("en", "#,##0");
        assert!(Arc::ptr_eq(&a, &b));
        cache.get("de", "#,##0");
        assert_eq!(cache.len(), 2);
    }
}
