use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{Part, StudentRecord};

#[derive(Debug, Clone, PartialEq)]
pub struct Promotion {
    pub student_id: String,
    pub name: String,
    pub from: Part,
    pub to: Part,
}

/// Students that a progression run would move, using the transition table.
/// An empty `from_parts` means every part on the track.
pub fn preview(students: &[StudentRecord], from_parts: &[Part]) -> Vec<Promotion> {
    students
        .iter()
        .filter(|student| from_parts.is_empty() || from_parts.contains(&student.part))
        .filter_map(|student| {
            student.part.next().map(|to| Promotion {
                student_id: student.id.clone(),
                name: student.full_name.clone(),
                from: student.part,
                to,
            })
        })
        .collect()
}

/// Promotions counted per transition, labelled the way the backend reports them.
pub fn tally(promotions: &[Promotion]) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();
    for promotion in promotions {
        *counts
            .entry(format!("{} -> {}", promotion.from, promotion.to))
            .or_insert(0) += 1;
    }
    counts
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProgressRequest {
    #[serde(rename = "fromParts", skip_serializing_if = "Vec::is_empty")]
    pub from_parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProgressOutcome {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub updated: u64,
    #[serde(default)]
    pub details: BTreeMap<String, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student(id: &str, part: Part) -> StudentRecord {
        StudentRecord {
            id: id.to_string(),
            full_name: format!("Student {id}"),
            class: None,
            shift: None,
            part,
            phone: String::new(),
            emergency_phone: String::new(),
        }
    }

    #[test]
    fn preview_skips_terminal_and_untracked_students() {
        let students = vec![
            student("a", Part::Part7),
            student("b", Part::None),
            student("c", Part::Congratulations),
            student("d", Part::TopOne),
        ];
        let promotions = preview(&students, &[]);
        assert_eq!(promotions.len(), 2);
        assert_eq!(promotions[0].to, Part::NewTopOne);
        assert_eq!(promotions[1].to, Part::Congratulations);
    }

    #[test]
    fn preview_honours_selected_parts() {
        let students = vec![student("a", Part::Part1), student("b", Part::Part2)];
        let promotions = preview(&students, &[Part::Part2]);
        assert_eq!(promotions.len(), 1);
        assert_eq!(promotions[0].student_id, "b");
        assert_eq!(tally(&promotions).get("Part 2 -> Part 3"), Some(&1));
    }

    #[test]
    fn request_omits_empty_part_list() {
        let body = serde_json::to_value(ProgressRequest::default()).unwrap();
        assert_eq!(body, serde_json::json!({}));
        let body = serde_json::to_value(ProgressRequest { from_parts: vec![Part::Part0] }).unwrap();
        assert_eq!(body, serde_json::json!({"fromParts": ["Part 0"]}));
    }
}
