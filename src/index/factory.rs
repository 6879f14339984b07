//! Maintainer factory
//!
//! The host looks factories up by index type and asks them to validate a
//! definition before creating a maintainer for it.

use super::config::RefcountIndexConfig;
use super::errors::{IndexError, IndexResult};
use super::maintainer::{IndexDefinition, RefcountIndexMaintainer, REFCOUNT_INDEX_TYPE};

/// Creates maintainers for the index types it declares
pub trait IndexMaintainerFactory {
    type Maintainer;

    /// Index type names this factory handles
    fn index_types(&self) -> &'static [&'static str];

    /// Reject definitions this factory cannot maintain
    fn validate(&self, index: &IndexDefinition) -> IndexResult<()>;

    /// Validate, then return a maintainer ready for use
    fn create(&self, index: IndexDefinition) -> IndexResult<Self::Maintainer>;
}

/// Factory for `refcount` indexes
#[derive(Debug, Clone, Default)]
pub struct RefcountIndexMaintainerFactory {
    config: RefcountIndexConfig,
}

impl RefcountIndexMaintainerFactory {
    pub fn new(config: RefcountIndexConfig) -> Self {
        Self { config }
    }
}

impl IndexMaintainerFactory for RefcountIndexMaintainerFactory {
    type Maintainer = RefcountIndexMaintainer;

    fn index_types(&self) -> &'static [&'static str] {
        &[REFCOUNT_INDEX_TYPE]
    }

    fn validate(&self, index: &IndexDefinition) -> IndexResult<()> {
        if !self.index_types().contains(&index.index_type.as_str()) {
            return Err(IndexError::invalid_index(format!(
                "Index '{}' has type '{}', expected '{}'",
                index.name, index.index_type, REFCOUNT_INDEX_TYPE
            )));
        }
        if index.name.is_empty() {
            return Err(IndexError::invalid_index("Index name is empty"));
        }
        if index.subspace.is_empty() {
            return Err(IndexError::invalid_index(format!(
                "Index '{}' has no assigned subspace",
                index.name
            )));
        }
        self.config.validate()
    }

    fn create(&self, index: IndexDefinition) -> IndexResult<RefcountIndexMaintainer> {
        self.validate(&index)?;
        let mut maintainer = RefcountIndexMaintainer::new(index, self.config.clone())?;
        maintainer.bind()?;
        maintainer.activate()?;
        Ok(maintainer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexErrorCode, MaintainerState};
    use crate::tuple::Tuple;

    #[test]
    fn test_index_types() {
        let factory = RefcountIndexMaintainerFactory::default();
        assert_eq!(factory.index_types(), &["refcount"]);
    }

    #[test]
    fn test_create_returns_active_maintainer() {
        let factory = RefcountIndexMaintainerFactory::default();
        let maintainer = factory
            .create(IndexDefinition::refcount("refs", Tuple::new().push("store").push("refs")))
            .unwrap();
        assert_eq!(maintainer.state(), MaintainerState::Active);
    }

    #[test]
    fn test_validate_rejects_wrong_type() {
        let factory = RefcountIndexMaintainerFactory::default();
        let mut index = IndexDefinition::refcount("refs", Tuple::new().push("store"));
        index.index_type = "value".to_string();
        let err = factory.validate(&index).unwrap_err();
        assert_eq!(err.code(), IndexErrorCode::AeroRefcountInvalidIndex);
    }

    #[test]
    fn test_validate_rejects_empty_subspace() {
        let factory = RefcountIndexMaintainerFactory::default();
        let err = factory
            .create(IndexDefinition::refcount("refs", Tuple::new()))
            .unwrap_err();
        assert_eq!(err.code(), IndexErrorCode::AeroRefcountInvalidIndex);
    }
}
