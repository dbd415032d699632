//! Sensitivity label lookup.

use super::PolicyError;
use crate::host::Label;

/// Resolve a label name to its id.  Names match exactly (case-sensitive);
/// sub-labels are searched depth-first after their parent.  There is no
/// default id: a missing name is `LabelNotFound`.
pub fn resolve_label_id<'a>(name: &str, catalog: &'a [Label]) -> Result<&'a str, PolicyError> {
    find(name, catalog)
        .map(|label| label.id.as_str())
        .ok_or_else(|| PolicyError::LabelNotFound(name.to_owned()))
}

fn find<'a>(name: &str, labels: &'a [Label]) -> Option<&'a Label> {
    for label in labels {
        if label.name == name {
            return Some(label);
        }
        if let Some(child) = find(name, &label.children) {
            return Some(child);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Vec<Label> {
        let mut confidential = Label::new("C0", "Confidential");
        confidential.children = vec![Label::new("C1", "Legal Only")];
        vec![
            Label::new("G0", "General"),
            confidential,
            Label::new("L1", "Highly Confidential"),
        ]
    }

    #[test]
    fn resolves_top_level_name() {
        assert_eq!(resolve_label_id("Highly Confidential", &catalog()).unwrap(), "L1");
    }

    #[test]
    fn resolves_sub_label() {
        assert_eq!(resolve_label_id("Legal Only", &catalog()).unwrap(), "C1");
    }

    #[test]
    fn name_match_is_case_sensitive() {
        let err = resolve_label_id("highly confidential", &catalog()).unwrap_err();
        assert!(matches!(err, PolicyError::LabelNotFound(ref n) if n == "highly confidential"));
    }

    #[test]
    fn empty_catalog_never_yields_an_id() {
        assert!(resolve_label_id("Highly Confidential", &[]).is_err());
    }
}
