//! Builders for feed lines and bodies.

#![allow(dead_code)]

/// A 12-column line with the given currency, province and product at the
/// standard offsets (3, 10, 11).
pub fn line_with(currency: &str, province: &str, product: &str) -> String {
    let mut columns = vec!["x"; 12];
    columns[3] = currency;
    columns[10] = province;
    columns[11] = product;
    columns.join(";")
}

/// A line every default-reference harness accepts.
pub fn valid_line() -> String {
    line_with("EUR", "BC", "WIDGET")
}

/// A line rejected with `too_few_columns` under any minimum above 3.
pub fn short_line() -> String {
    "a;b;c".to_string()
}

/// Joins lines into a feed body with a trailing newline.
pub fn feed(lines: &[String]) -> Vec<u8> {
    let mut body = lines.join("\n");
    body.push('\n');
    body.into_bytes()
}

/// A feed of `count` valid lines.
pub fn valid_feed(count: usize) -> Vec<u8> {
    feed(&vec![valid_line(); count])
}

/// A feed of `count` lines where the listed 1-based line numbers are
/// replaced with short (invalid) lines.
pub fn feed_with_bad_lines(count: usize, bad_lines: &[usize]) -> Vec<u8> {
    let lines: Vec<String> = (1..=count)
        .map(|number| {
            if bad_lines.contains(&number) {
                short_line()
            } else {
                valid_line()
            }
        })
        .collect();
    feed(&lines)
}
