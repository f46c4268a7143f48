use std::cmp::Ordering;

/// Versions containing `dev` are treated as always newer than what is installed.
pub fn is_dev_version(version: &str) -> bool {
    version.contains("dev")
}

/// True when `candidate` should replace `installed`.
pub fn is_newer_version(candidate: &str, installed: Option<&str>) -> bool {
    if is_dev_version(candidate) {
        return true;
    }
    compare_versions(candidate, installed.unwrap_or("")) == Ordering::Greater
}

/// Dotted version comparison.
///
/// Versions are split into parts at `.`, `-`, `_`, `+` and at every
/// transition between digits and letters. Numeric parts compare numerically.
/// Word parts rank `dev < alpha (a) < beta (b) < rc < <number> < pl (p)`, and
/// unrecognised words rank below `dev`. Extra trailing numbers make a version
/// newer, extra trailing words rank against a number, so `1.0 < 1.0.1`,
/// `1.0rc1 < 1.0` and `1.0 < 1.0pl1`.
pub fn compare_versions(left: &str, right: &str) -> Ordering {
    let left = version_parts(left);
    let right = version_parts(right);

    for index in 0..left.len().max(right.len()) {
        let ordering = match (left.get(index), right.get(index)) {
            (Some(l), Some(r)) => compare_parts(l, r),
            (Some(l), None) => trailing_part(l),
            (None, Some(r)) => trailing_part(r).reverse(),
            (None, None) => Ordering::Equal,
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

const NUMBER_RANK: i8 = 4;

#[derive(Debug, PartialEq, Eq)]
enum Part {
    Number(u64),
    Word(String),
}

fn version_parts(version: &str) -> Vec<Part> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut current_is_digit = false;

    let mut flush = |current: &mut String, is_digit: bool| {
        if current.is_empty() {
            return;
        }
        let part = if is_digit {
            current
                .parse::<u64>()
                .map(Part::Number)
                .unwrap_or_else(|_| Part::Word(current.clone()))
        } else {
            Part::Word(current.to_ascii_lowercase())
        };
        parts.push(part);
        current.clear();
    };

    for ch in version.trim().chars() {
        if matches!(ch, '.' | '-' | '_' | '+') {
            flush(&mut current, current_is_digit);
            continue;
        }
        let is_digit = ch.is_ascii_digit();
        if !current.is_empty() && is_digit != current_is_digit {
            flush(&mut current, current_is_digit);
        }
        current_is_digit = is_digit;
        current.push(ch);
    }
    flush(&mut current, current_is_digit);
    parts
}

fn trailing_part(part: &Part) -> Ordering {
    match part {
        Part::Number(_) => Ordering::Greater,
        Part::Word(_) => rank(part).cmp(&NUMBER_RANK),
    }
}

fn compare_parts(left: &Part, right: &Part) -> Ordering {
    match (left, right) {
        (Part::Number(l), Part::Number(r)) => l.cmp(r),
        _ => rank(left).cmp(&rank(right)),
    }
}

fn rank(part: &Part) -> i8 {
    match part {
        Part::Number(_) => NUMBER_RANK,
        Part::Word(word) => match word.as_str() {
            "dev" => 0,
            "alpha" | "a" => 1,
            "beta" | "b" => 2,
            "rc" => 3,
            "pl" | "p" => 5,
            _ => -1,
        },
    }
}
