//! Scene id sequencing utilities.
//!
//! Pure string transforms used by batch tooling to derive related scene
//! ids from a base id (`scene_01` -> `scene_02`, ...).

/// Increment the last run of digits in a scene id by `step`.
///
/// The digit run is left-padded back to its original width, so growth
/// beyond that width is allowed (`scene_99` -> `scene_100`). Ids without
/// any digits get the increment appended with an underscore
/// (`noNumberHere` -> `noNumberHere_1`).
pub fn increment_scene_id(scene_id: &str, step: u64) -> String {
    let bytes = scene_id.as_bytes();

    // Locate the last maximal run of ASCII digits
    let mut end = None;
    let mut i = bytes.len();
    while i > 0 {
        i -= 1;
        if bytes[i].is_ascii_digit() {
            end = Some(i + 1);
            break;
        }
    }

    let Some(end) = end else {
        return format!("{}_{}", scene_id, step);
    };

    let mut start = end;
    while start > 0 && bytes[start - 1].is_ascii_digit() {
        start -= 1;
    }

    let digits = &scene_id[start..end];
    let width = digits.len();
    // A maximal digit run always parses unless it overflows u64; saturate
    // rather than wrap in that pathological case
    let value = digits.parse::<u64>().unwrap_or(u64::MAX);
    let incremented = value.saturating_add(step);

    format!(
        "{}{:0width$}{}",
        &scene_id[..start],
        incremented,
        &scene_id[end..],
        width = width
    )
}

/// Derive `count` scene ids starting from `base`, stepping by `step`.
///
/// The base id itself is the first entry.
pub fn sequence_ids(base: &str, count: usize, step: u64) -> Vec<String> {
    let mut ids = Vec::with_capacity(count);
    let mut current = base.to_string();
    for i in 0..count {
        if i > 0 {
            current = increment_scene_id(&current, step);
        }
        ids.push(current.clone());
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_padded() {
        assert_eq!(increment_scene_id("scene_01", 1), "scene_02");
        assert_eq!(increment_scene_id("scene_09", 1), "scene_10");
    }

    #[test]
    fn test_increment_grows_past_width() {
        assert_eq!(increment_scene_id("scene_99", 1), "scene_100");
    }

    #[test]
    fn test_increment_with_step() {
        assert_eq!(increment_scene_id("shot_5", 3), "shot_8");
    }

    #[test]
    fn test_no_digits_appends_suffix() {
        assert_eq!(increment_scene_id("noNumberHere", 1), "noNumberHere_1");
    }

    #[test]
    fn test_last_digit_run_wins() {
        assert_eq!(increment_scene_id("act2_scene_04", 1), "act2_scene_05");
    }

    #[test]
    fn test_trailing_text_preserved() {
        assert_eq!(increment_scene_id("scene_04_final", 1), "scene_05_final");
    }

    #[test]
    fn test_sequence_ids() {
        assert_eq!(
            sequence_ids("scene_01", 3, 1),
            vec!["scene_01", "scene_02", "scene_03"]
        );
        assert_eq!(sequence_ids("intro", 2, 1), vec!["intro", "intro_1"]);
    }
}
