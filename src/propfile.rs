//! Property file parser
//!
//! Reads simple `key = value` files. `#` starts a comment anywhere on a
//! line, blank lines are skipped and whitespace around keys and values is
//! trimmed. Key case is preserved.

/// Parse `data`, invoking `handler` with `(line_number, key, value)` for
/// every entry. Line numbers start at 1.
///
/// Lines without `=` are skipped with a warning.
pub fn parse_propfile(data: &str, handler: &mut dyn FnMut(usize, &str, &str)) {
    for (index, raw) in data.lines().enumerate() {
        let line_no = index + 1;
        let line = match raw.find('#') {
            Some(pos) => &raw[..pos],
            None => raw,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            log::warn!("line {}: key without value: '{}'", line_no, line);
            continue;
        };

        let key = key.trim();
        if key.is_empty() {
            log::warn!("line {}: value without key", line_no);
            continue;
        }
        handler(line_no, key, value.trim());
    }
}
