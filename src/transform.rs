use crate::matrix::Matrix;
use crate::path::Scanner;

/// Folds an SVG `transform` list into one matrix, applied left to right.
///
/// Unknown function names push a warning and contribute the identity. Malformed syntax
/// (unbalanced parentheses, bad argument counts) fails the whole attribute.
pub fn parse_transform(input: &str, warnings: &mut Vec<String>) -> Result<Matrix, String> {
    let mut out = Matrix::identity();
    let mut rest = input.trim();

    while !rest.is_empty() {
        let Some(open) = rest.find('(') else {
            return Err(format!("invalid transform '{input}'"));
        };
        let name = rest[..open].trim();
        let Some(close) = rest[open + 1..].find(')') else {
            return Err(format!("unterminated transform function '{name}'"));
        };
        let args = parse_arguments(&rest[open + 1..open + 1 + close])
            .ok_or_else(|| format!("invalid arguments to transform function '{name}'"))?;

        let m = match (name, args.as_slice()) {
            ("matrix", &[a, b, c, d, e, f]) => Matrix::new(a, b, c, d, e, f),
            ("translate", &[tx]) => Matrix::translate(tx, 0.0),
            ("translate", &[tx, ty]) => Matrix::translate(tx, ty),
            ("scale", &[s]) => Matrix::scale(s, s),
            ("scale", &[sx, sy]) => Matrix::scale(sx, sy),
            ("rotate", &[angle]) => Matrix::rotate(angle),
            ("rotate", &[angle, cx, cy]) => Matrix::translate(cx, cy)
                .multiply(Matrix::rotate(angle))
                .multiply(Matrix::translate(-cx, -cy)),
            ("skewX", &[angle]) => Matrix::skew_x(angle),
            ("skewY", &[angle]) => Matrix::skew_y(angle),
            ("matrix" | "translate" | "scale" | "rotate" | "skewX" | "skewY", _) => {
                return Err(format!(
                    "wrong number of arguments ({}) to transform function '{name}'",
                    args.len()
                ));
            }
            _ => {
                warnings.push(format!("unknown transform function '{name}' ignored"));
                Matrix::identity()
            }
        };

        out = out.multiply(m);
        rest = rest[open + 1 + close + 1..].trim_start();
        rest = rest.strip_prefix(',').unwrap_or(rest).trim_start();
    }

    Ok(out)
}

fn parse_arguments(input: &str) -> Option<Vec<f64>> {
    let mut scanner = Scanner::new(input);
    let mut out = Vec::new();
    while !scanner.is_empty() {
        out.push(scanner.number()?);
    }
    Some(out)
}

/// Whitespace/comma separated number list (`points`, `stroke-dasharray`, `viewBox`, ...).
/// Returns `None` if any token is not a number.
pub fn parse_number_list(input: &str) -> Option<Vec<f64>> {
    parse_arguments(input)
}
