//! JSON I/O handling for CLI
//!
//! - Input: JSON lines via stdin
//! - Output: single JSON object via stdout
//! - UTF-8 only

use std::io::{self, BufRead, Write};

use serde_json::Value;

use super::errors::{CliError, CliResult};

/// Read one JSON request from stdin
pub fn read_request() -> CliResult<Value> {
    let stdin = io::stdin();
    let mut line = String::new();

    stdin.lock().read_line(&mut line)?;

    if line.trim().is_empty() {
        return Err(CliError::io_error("Empty input"));
    }

    let value: Value = serde_json::from_str(&line)?;
    Ok(value)
}

/// Read JSON lines from any reader, skipping blank lines
pub fn read_lines<R: BufRead>(reader: R) -> impl Iterator<Item = CliResult<Value>> {
    reader.lines().filter_map(|line| match line {
        Ok(line) if line.trim().is_empty() => None,
        Ok(line) => Some(serde_json::from_str(&line).map_err(CliError::from)),
        Err(e) => Some(Err(CliError::from(e))),
    })
}

/// Write a success response to stdout
pub fn write_response(data: Value) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "ok",
        "data": data
    });

    let mut stdout = io::stdout();
    serde_json::to_writer(&mut stdout, &response)?;
    writeln!(stdout)?;
    stdout.flush()?;

    Ok(())
}

/// Write an error response to stdout
pub fn write_error(error: &CliError) -> CliResult<()> {
    let response = error.to_json();

    let mut stdout = io::stdout();
    serde_json::to_writer(&mut stdout, &response)?;
    writeln!(stdout)?;
    stdout.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_lines_skips_blanks() {
        let input = "{\"a\":1}\n\n{\"b\":2}\n";
        let values: Vec<_> = read_lines(input.as_bytes()).collect::<CliResult<_>>().unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values[1]["b"], 2);
    }

    #[test]
    fn test_read_lines_reports_bad_json() {
        let mut lines = read_lines("not json\n".as_bytes());
        assert!(lines.next().unwrap().is_err());
    }
}
