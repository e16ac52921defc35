use owo_colors::OwoColorize;

use super::ParseError;

/// Renders a parse error with the offending source line underneath.
pub fn render_parse_error(source: &str, filename: &str, err: &ParseError, styled: bool) -> String {
    let head = if styled {
        format!("{}: {}", "error".red().bold(), err.message)
    } else {
        format!("error: {}", err.message)
    };

    let Some(text) = err
        .line
        .checked_sub(1)
        .and_then(|index| source.lines().nth(index))
    else {
        return head;
    };

    let gutter = if styled {
        format!("{}", "|".blue())
    } else {
        "|".to_string()
    };
    format!(
        "{head}\n --> {filename}:{line}\n  {gutter}\n{line:>3} {gutter} {text}",
        line = err.line
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{ParserMode, parse_program};

    #[test]
    fn plain_rendering_points_at_the_line() {
        let source = "a = 1\nclass {";
        let err = parse_program(source, ParserMode::Normal).expect_err("should fail");
        let rendered = render_parse_error(source, "main.lito", &err, false);
        assert!(rendered.starts_with("error: "), "{rendered}");
        assert!(rendered.contains("main.lito:"), "{rendered}");
    }
}
