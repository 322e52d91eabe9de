//! Line formats of the bounding-box dumps.

use crate::bbox::Detection;
use crate::geometry::{Dims, OriginalRect};
use crate::util::{DetectError, DetectResult};

/// One parsed line of the canonical dump.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct CanonicalRecord {
    pub name: String,
    pub dims: Dims,
    pub detection: Detection,
}

/// `<name> <height> <width> <class> <confidence> <left> <top> <right> <bottom>`
pub(crate) fn canonical_line(name: &str, dims: Dims, d: &Detection) -> String {
    format!(
        "{} {} {} {} {} {} {} {} {}",
        name,
        dims.height,
        dims.width,
        d.class_id,
        d.confidence,
        d.rect.left,
        d.rect.top,
        d.rect.right(),
        d.rect.bottom()
    )
}

/// `<left>,<top>,<width>,<height>,<confidence>`
pub(crate) fn caltech_line(d: &Detection) -> String {
    format!(
        "{},{},{},{},{}",
        d.rect.left, d.rect.top, d.rect.width, d.rect.height, d.confidence
    )
}

/// `<name>; <class>`
pub(crate) fn class_line(name: &str, d: &Detection) -> String {
    format!("{}; {}", name, d.class_id)
}

/// Splits a canonical line into the name and the 8 trailing fields.
///
/// The name is everything before the trailing fields, so it may be empty or
/// contain whitespace.
fn split_canonical(text: &str) -> Option<(&str, [&str; 8])> {
    let mut rest = text.trim_end();
    let mut fields = [""; 8];
    for slot in fields.iter_mut().rev() {
        rest = rest.trim_end();
        let (head, field) = match rest.rfind(char::is_whitespace) {
            Some(i) => {
                let ws = rest[i..].chars().next().map_or(1, char::len_utf8);
                (&rest[..i], &rest[i + ws..])
            }
            None => ("", rest),
        };
        if field.is_empty() {
            return None;
        }
        *slot = field;
        rest = head;
    }
    Some((rest, fields))
}

/// Parses a canonical line; `line` is 1-based and only used for errors.
pub(crate) fn parse_canonical(line: usize, text: &str) -> DetectResult<CanonicalRecord> {
    let Some((name, fields)) = split_canonical(text) else {
        return Err(DetectError::Parse {
            line,
            reason: format!(
                "expected a name and 8 fields, found {} fields",
                text.split_whitespace().count()
            ),
        });
    };
    let int = |i: usize| -> DetectResult<usize> {
        fields[i].parse().map_err(|_| DetectError::Parse {
            line,
            reason: format!("field {} is not an integer: {:?}", i + 2, fields[i]),
        })
    };
    let float = |i: usize| -> DetectResult<f32> {
        fields[i].parse().map_err(|_| DetectError::Parse {
            line,
            reason: format!("field {} is not a number: {:?}", i + 2, fields[i]),
        })
    };
    let dims = Dims::new(int(0)?, int(1)?);
    let class_id = int(2)?;
    let confidence = float(3)?;
    let (left, top, right, bottom) = (float(4)?, float(5)?, float(6)?, float(7)?);
    if right < left || bottom < top {
        return Err(DetectError::Parse {
            line,
            reason: format!("inverted box ({left}, {top}, {right}, {bottom})"),
        });
    }
    Ok(CanonicalRecord {
        name: name.to_string(),
        dims,
        detection: Detection::new(
            class_id,
            confidence,
            OriginalRect::from_corners(top, left, bottom, right),
        ),
    })
}
