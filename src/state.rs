use std::sync::Arc;

use crate::{
    auth::JwtAuth, config::Configuration, discover::ArcProber, remux::ArcRemuxer, repo::ArcRepo,
    tmp_file::ArcTmpDir,
};

#[derive(Clone)]
pub(crate) struct State<S> {
    pub(super) config: Configuration,
    pub(super) tmp_dir: ArcTmpDir,
    pub(super) repo: ArcRepo,
    pub(super) store: S,
    pub(super) auth: Arc<JwtAuth>,
    pub(super) prober: ArcProber,
    pub(super) remuxer: ArcRemuxer,
}
