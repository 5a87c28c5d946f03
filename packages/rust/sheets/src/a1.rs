//! A1-notation helpers.

use shardscrape_shared::ColumnRef;

/// Prefix `range` with a quoted worksheet name: `'Sheet 2'!AJ5`.
///
/// Quoting is always valid, so names are quoted unconditionally; embedded
/// single quotes are doubled.
pub fn qualify(worksheet: &str, range: &str) -> String {
    format!("'{}'!{range}", worksheet.replace('\'', "''"))
}

/// Whole-column range, e.g. `'Sheet1'!G:G`.
pub fn column_range(worksheet: &str, column: &ColumnRef) -> String {
    qualify(worksheet, &format!("{column}:{column}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualifies_plain_and_quoted_names() {
        assert_eq!(qualify("Sheet2", "AJ5"), "'Sheet2'!AJ5");
        assert_eq!(qualify("Bob's list", "A1"), "'Bob''s list'!A1");
    }

    #[test]
    fn builds_column_range() {
        let col = ColumnRef::parse("G").unwrap();
        assert_eq!(column_range("Sheet1", &col), "'Sheet1'!G:G");
    }
}
