use serde::{Deserialize, Serialize};

/// Selects a prompt template and safety policy inside the shim (§F, glossary
/// "Feature tag"). Modeled as a closed enum over the families the original's
/// consoles expose, with an escape hatch for values not yet known to this
/// binary — the same shape `slab_llama::token::LlamaToken` uses at its FFI
/// boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureTag {
    PromptApi,
    Summarizer,
    Writer,
    Proofreader,
    TestFeature,
    Other(u32),
}

impl FeatureTag {
    pub fn as_u32(self) -> u32 {
        match self {
            FeatureTag::PromptApi => 1,
            FeatureTag::Summarizer => 2,
            FeatureTag::Writer => 3,
            FeatureTag::Proofreader => 4,
            FeatureTag::TestFeature => 5,
            FeatureTag::Other(v) => v,
        }
    }

    pub fn from_u32(v: u32) -> Self {
        match v {
            1 => FeatureTag::PromptApi,
            2 => FeatureTag::Summarizer,
            3 => FeatureTag::Writer,
            4 => FeatureTag::Proofreader,
            5 => FeatureTag::TestFeature,
            other => FeatureTag::Other(other),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trips_through_u32() {
        for tag in [
            FeatureTag::PromptApi,
            FeatureTag::Summarizer,
            FeatureTag::Writer,
            FeatureTag::Proofreader,
            FeatureTag::TestFeature,
        ] {
            assert_eq!(FeatureTag::from_u32(tag.as_u32()), tag);
        }
        assert_eq!(FeatureTag::from_u32(999), FeatureTag::Other(999));
    }
}
