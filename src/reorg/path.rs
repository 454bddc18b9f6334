use super::plan::PlanError;
use crate::model::FlatCategory;

/// Splits a category name into trimmed path segments.
///
/// A name without the delimiter is a single-segment path. Blank segments
/// (including a blank name) are rejected rather than turned into nameless
/// nodes.
pub fn parse_path(category: &FlatCategory, delimiter: &str) -> Result<Vec<String>, PlanError> {
    let segments: Vec<String> = if category.name.contains(delimiter) {
        category
            .name
            .split(delimiter)
            .map(|part| part.trim().to_string())
            .collect()
    } else {
        vec![category.name.trim().to_string()]
    };

    if let Some(position) = segments.iter().position(String::is_empty) {
        return Err(PlanError::MalformedCategoryName {
            id: category.id,
            name: category.name.clone(),
            position,
        });
    }

    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(name: &str) -> Result<Vec<String>, PlanError> {
        parse_path(&FlatCategory::new(1, name), ">>")
    }

    #[test]
    fn name_without_delimiter_is_single_trimmed_segment() {
        assert_eq!(parse("Đồ uống").unwrap(), vec!["Đồ uống"]);
        assert_eq!(parse("  Bánh kẹo ").unwrap(), vec!["Bánh kẹo"]);
    }

    #[test]
    fn delimited_name_yields_delimiter_count_plus_one_segments() {
        let name = "Gia vị >> Nước chấm>>  Mắm ruốc, mắm nêm";
        let segments = parse(name).unwrap();
        assert_eq!(segments.len(), name.matches(">>").count() + 1);
        assert_eq!(segments, vec!["Gia vị", "Nước chấm", "Mắm ruốc, mắm nêm"]);
    }

    #[test]
    fn single_angle_bracket_is_not_a_delimiter() {
        assert_eq!(parse("A > B").unwrap(), vec!["A > B"]);
    }

    #[test]
    fn empty_segments_are_reported_with_position() {
        match parse("Gia vị>> >>Mắm tôm") {
            Err(PlanError::MalformedCategoryName { id, position, .. }) => {
                assert_eq!(id, 1);
                assert_eq!(position, 1);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(matches!(
            parse(">>Gia vị"),
            Err(PlanError::MalformedCategoryName { position: 0, .. })
        ));
        assert!(matches!(
            parse("   "),
            Err(PlanError::MalformedCategoryName { position: 0, .. })
        ));
    }

    #[test]
    fn custom_delimiter() {
        let segments = parse_path(&FlatCategory::new(2, "A / B / C"), "/").unwrap();
        assert_eq!(segments, vec!["A", "B", "C"]);
    }
}
