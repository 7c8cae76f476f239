//! Builders for `tf.Example` records, the input format of the
//! regress and classify signatures.

use prost::Message;

use crate::protos::tensorflow::{
    feature, BytesList, Example, Feature, Features, FloatList, Int64List,
};

#[derive(Debug, Clone, Default)]
pub struct ExampleBuilder {
    features: Features,
}

impl ExampleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(mut self, name: impl Into<String>, kind: feature::Kind) -> Self {
        self.features
            .feature
            .insert(name.into(), Feature { kind: Some(kind) });
        self
    }

    pub fn float(self, name: impl Into<String>, values: impl Into<Vec<f32>>) -> Self {
        self.insert(
            name,
            feature::Kind::FloatList(FloatList {
                value: values.into(),
            }),
        )
    }

    pub fn int64(self, name: impl Into<String>, values: impl Into<Vec<i64>>) -> Self {
        self.insert(
            name,
            feature::Kind::Int64List(Int64List {
                value: values.into(),
            }),
        )
    }

    pub fn bytes<B: Into<Vec<u8>>>(
        self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = B>,
    ) -> Self {
        self.insert(
            name,
            feature::Kind::BytesList(BytesList {
                value: values.into_iter().map(Into::into).collect(),
            }),
        )
    }

    pub fn build(self) -> Example {
        Example {
            features: Some(self.features),
        }
    }

    /// Serialized record, ready to go into a string tensor
    pub fn encode(self) -> Vec<u8> {
        self.build().encode_to_vec()
    }
}

/// Single-feature example holding one float, e.g. `{"x": [value]}`
pub fn float_example(feature: &str, value: f32) -> Vec<u8> {
    ExampleBuilder::new().float(feature, vec![value]).encode()
}

/// Read back a float feature from a serialized example
pub fn float_feature(example: &Example, name: &str) -> Option<Vec<f32>> {
    let feature = example.features.as_ref()?.feature.get(name)?;
    match &feature.kind {
        Some(feature::Kind::FloatList(list)) => Some(list.value.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_example_round_trip() {
        let bytes = float_example("x", 1.5);
        let example = Example::decode(bytes.as_slice()).unwrap();
        assert_eq!(float_feature(&example, "x"), Some(vec![1.5]));
        assert_eq!(float_feature(&example, "missing"), None);
    }

    #[test]
    fn test_mixed_features() {
        let example = ExampleBuilder::new()
            .float("x", vec![0.5f32, 1.0])
            .int64("id", vec![7i64])
            .bytes("label", ["cat"])
            .build();
        let features = &example.features.as_ref().unwrap().feature;
        assert_eq!(features.len(), 3);
        assert!(matches!(
            features["id"].kind,
            Some(feature::Kind::Int64List(ref list)) if list.value == [7i64]
        ));
        assert!(matches!(
            features["label"].kind,
            Some(feature::Kind::BytesList(ref list)) if list.value == [b"cat".to_vec()]
        ));
        // non-float features are not returned as floats
        assert_eq!(float_feature(&example, "id"), None);
    }
}
