use crate::data::loader::ModelInput;
use std::collections::BTreeSet;

/// Maps label strings to the integer keys the classifier is trained on, and back.
///
/// Keys follow the sorted order of the class names, so the same folder tree
/// always produces the same mapping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelMap {
    classes: Vec<String>,
}

impl LabelMap {
    pub fn new(classes: Vec<String>) -> Self {
        let classes: BTreeSet<String> = classes.into_iter().collect();
        Self {
            classes: classes.into_iter().collect(),
        }
    }

    pub fn from_inputs(inputs: &[ModelInput]) -> Self {
        Self::new(inputs.iter().map(|input| input.label.clone()).collect())
    }

    pub fn encode(&self, label: &str) -> Option<usize> {
        self.classes
            .binary_search_by(|class| class.as_str().cmp(label))
            .ok()
    }

    pub fn decode(&self, key: usize) -> Option<&str> {
        self.classes.get(key).map(String::as_str)
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_follow_sorted_class_names() {
        let labels = LabelMap::new(vec![
            "tulip".into(),
            "daisy".into(),
            "rose".into(),
            "daisy".into(),
        ]);

        assert_eq!(labels.len(), 3);
        assert_eq!(labels.encode("daisy"), Some(0));
        assert_eq!(labels.encode("rose"), Some(1));
        assert_eq!(labels.encode("tulip"), Some(2));
        assert_eq!(labels.encode("sunflower"), None);
    }

    #[test]
    fn decode_reverses_encode() {
        let labels = LabelMap::new(vec!["dandelion".into(), "sunflower".into()]);
        for class in labels.classes() {
            let key = labels.encode(class).unwrap();
            assert_eq!(labels.decode(key), Some(class.as_str()));
        }
        assert_eq!(labels.decode(2), None);
    }
}
