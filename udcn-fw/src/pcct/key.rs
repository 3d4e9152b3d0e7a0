use std::collections::hash_map::DefaultHasher;
use std::hash::Hasher;

use udcn_common::{PCC_KEY_EXT_LEN, PCC_KEY_INLINE_LEN};
use udcn_core::Name;

/// Lookup key: a name plus an optional forwarding hint
#[derive(Debug, Clone, Copy)]
pub struct PccSearch<'a> {
    pub name: &'a Name,
    pub fwhint: Option<&'a Name>,
}

impl<'a> PccSearch<'a> {
    pub fn new(name: &'a Name, fwhint: Option<&'a Name>) -> Self {
        Self { name, fwhint }
    }

    pub fn hash(&self) -> u64 {
        match self.fwhint {
            None => self.name.hash_value(),
            Some(fh) => {
                let mut hasher = DefaultHasher::new();
                hasher.write_u64(self.name.hash_value());
                hasher.write_u64(fh.hash_value());
                hasher.finish()
            }
        }
    }

    fn stored_len(&self) -> usize {
        self.name.value().len() + self.fwhint.map_or(0, |fh| fh.value().len())
    }

    /// Extension blocks needed beyond the inline key area
    pub fn ext_blocks(&self) -> usize {
        let len = self.stored_len();
        if len <= PCC_KEY_INLINE_LEN {
            0
        } else {
            (len - PCC_KEY_INLINE_LEN).div_ceil(PCC_KEY_EXT_LEN)
        }
    }
}

/// Stored key of a PCC entry
#[derive(Debug, Clone)]
pub struct PccKey {
    name: Name,
    fwhint: Option<Name>,
    ext_blocks: usize,
}

impl PccKey {
    pub(crate) fn new(search: &PccSearch<'_>) -> Self {
        Self {
            name: search.name.clone(),
            fwhint: search.fwhint.cloned(),
            ext_blocks: search.ext_blocks(),
        }
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn fwhint(&self) -> Option<&Name> {
        self.fwhint.as_ref()
    }

    pub(crate) fn ext_blocks(&self) -> usize {
        self.ext_blocks
    }

    /// Exact byte comparison of both name and forwarding hint
    pub fn matches(&self, search: &PccSearch<'_>) -> bool {
        self.name.value() == search.name.value()
            && match (&self.fwhint, search.fwhint) {
                (None, None) => true,
                (Some(a), Some(b)) => a.value() == b.value(),
                _ => false,
            }
    }

    pub fn search(&self) -> PccSearch<'_> {
        PccSearch::new(&self.name, self.fwhint.as_ref())
    }
}
