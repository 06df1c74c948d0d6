pub(crate) mod const_fold;
pub(crate) mod prune;
