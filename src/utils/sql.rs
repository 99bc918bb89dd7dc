//! SQL literal escaping and script splitting shared by the SQL engines
//!
//! Dumps are replayed statement by statement, so every value written into a
//! script goes through one of the quoting functions below.

/// Quote a PostgreSQL string literal
///
/// Values containing backslashes or line breaks use the `E'...'` escape form
/// so a dumped value always stays on one script line.
pub fn pg_literal(value: &str) -> String {
    let needs_escape_form = value.contains(['\\', '\n', '\r']);
    let mut out = String::with_capacity(value.len() + 3);
    if needs_escape_form {
        out.push('E');
    }
    out.push('\'');
    for c in value.chars() {
        match c {
            '\'' => out.push_str("''"),
            '\\' if needs_escape_form => out.push_str("\\\\"),
            '\n' if needs_escape_form => out.push_str("\\n"),
            '\r' if needs_escape_form => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Quote a PostgreSQL identifier, doubling embedded double quotes
pub fn pg_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a MySQL string literal with backslash escapes
///
/// Escapes the same set as `mysql_real_escape_string`. Newlines are escaped
/// too, so a value can never end a script line with `;`.
pub fn mysql_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\0' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\x1a' => out.push_str("\\Z"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Quote a MySQL identifier with backticks
pub fn mysql_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Split a plain-text dump into statements
///
/// Blank lines and `--` comment lines are skipped; a statement ends on a line
/// whose trimmed text ends with `;`.
pub fn split_statements(script: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut buffer = String::new();

    for line in script.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("--") {
            continue;
        }

        buffer.push_str(line);
        buffer.push('\n');

        if trimmed.ends_with(';') {
            statements.push(buffer.trim().to_string());
            buffer.clear();
        }
    }

    let rest = buffer.trim();
    if !rest.is_empty() {
        statements.push(rest.to_string());
    }

    statements
}

/// Split a PostgreSQL dump into statements
///
/// Same line rules as [`split_statements`], except that a `;` line ending
/// inside a dollar-quoted body (`$$ ... $$`, `$fn$ ... $fn$`) does not end
/// the statement. Function definitions keep their bodies intact.
pub fn split_pg_statements(script: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut buffer = String::new();
    let mut open_tag: Option<Vec<u8>> = None;

    for line in script.lines() {
        let trimmed = line.trim();
        if open_tag.is_none() && (trimmed.is_empty() || trimmed.starts_with("--")) {
            continue;
        }

        buffer.push_str(line);
        buffer.push('\n');
        scan_dollar_quotes(line.as_bytes(), &mut open_tag);

        if open_tag.is_none() && trimmed.ends_with(';') {
            statements.push(buffer.trim().to_string());
            buffer.clear();
        }
    }

    let rest = buffer.trim();
    if !rest.is_empty() {
        statements.push(rest.to_string());
    }

    statements
}

/// First line of a statement, shortened for log lines and error labels
pub fn statement_preview(statement: &str) -> String {
    let first = statement.lines().next().unwrap_or("").trim();
    if first.chars().count() > 80 {
        format!("{}...", first.chars().take(80).collect::<String>())
    } else {
        first.to_string()
    }
}

/// Track dollar-quote open/close across one line, ignoring `$` inside '...'
fn scan_dollar_quotes(line: &[u8], open_tag: &mut Option<Vec<u8>>) {
    let mut in_single = false;
    let mut i = 0;

    while i < line.len() {
        if let Some(tag) = open_tag.as_ref() {
            if line[i..].starts_with(tag) {
                i += tag.len();
                *open_tag = None;
            } else {
                i += 1;
            }
            continue;
        }

        match line[i] {
            b'\'' => {
                in_single = !in_single;
                i += 1;
            }
            b'$' if !in_single => match dollar_tag(&line[i..]) {
                Some(tag) => {
                    i += tag.len();
                    *open_tag = Some(tag);
                }
                None => i += 1,
            },
            _ => i += 1,
        }
    }
}

/// `$tag$` at the start of `s`, if it is a valid dollar-quote delimiter
fn dollar_tag(s: &[u8]) -> Option<Vec<u8>> {
    let rest = &s[1..];
    let end = rest.iter().position(|&b| b == b'$')?;
    let tag = &rest[..end];

    let valid = tag.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'_')
        && !tag.first().map(|b| b.is_ascii_digit()).unwrap_or(false);

    valid.then(|| s[..end + 2].to_vec())
}
