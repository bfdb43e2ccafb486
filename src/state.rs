/// Where a [`BodyLoader`](crate::BodyLoader) is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    New,
    Loading,
    Loaded,
    Decoding,
    Decoded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScanStage {
    FindingBoundary,
    ReadingPartHeaders,
    Eof,
}
