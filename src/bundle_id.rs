use crate::bundle::Bundle;
use crate::dtntime::CreationTimestamp;
use crate::eid::EndpointID;
use crate::primary::{FragmentInfo, PrimaryBlock};
use core::fmt;

/// Identity of a bundle: source, creation timestamp and, for fragments,
/// the fragment position. Two bundles with the same id are the same bundle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BundleId {
    pub source: EndpointID,
    pub timestamp: CreationTimestamp,
    pub fragment: Option<FragmentInfo>,
}

impl BundleId {
    pub fn from_primary(primary: &PrimaryBlock) -> BundleId {
        BundleId {
            source: primary.source.clone(),
            timestamp: primary.creation_timestamp,
            fragment: primary.fragment.filter(|_| primary.is_fragment()),
        }
    }
    pub fn from_bundle(bundle: &Bundle) -> BundleId {
        BundleId::from_primary(&bundle.primary)
    }
    /// Id of the complete bundle a fragment belongs to.
    pub fn without_fragment(&self) -> BundleId {
        BundleId {
            fragment: None,
            ..self.clone()
        }
    }
    pub fn is_fragment(&self) -> bool {
        self.fragment.is_some()
    }
}

impl fmt::Display for BundleId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}",
            self.source,
            self.timestamp.dtntime(),
            self.timestamp.seqno()
        )?;
        if let Some(frag) = &self.fragment {
            write!(f, "-{}-{}", frag.offset, frag.total_adu_length)?;
        }
        Ok(())
    }
}
