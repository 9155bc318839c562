pub(super) fn init_metrics() {
    describe_toplevel();
    describe_ingest();
    describe_process();
    describe_object_storage();
    describe_repo();
}

fn describe_toplevel() {
    metrics::describe_counter!(VIDEO_FILES, "How many video files have been uploaded to tubely");
    metrics::describe_counter!(
        THUMBNAIL_FILES,
        "How many thumbnail files have been uploaded to tubely"
    );
}

pub(crate) const VIDEO_FILES: &str = "tubely.files.video";
pub(crate) const THUMBNAIL_FILES: &str = "tubely.files.thumbnail";

fn describe_ingest() {
    metrics::describe_counter!(INGEST_START, "How many video ingests have started");
    metrics::describe_counter!(
        INGEST_END,
        "How many video ingests have ended, by stage reached and failed step"
    );
    metrics::describe_histogram!(
        INGEST_DURATION,
        "Timings for video ingests, by stage reached and failed step"
    );
    metrics::describe_counter!(
        INGEST_ORPHAN_REMOVED,
        "How many uploaded objects were removed after failing to record them"
    );
}

pub(crate) const INGEST_START: &str = "tubely.ingest.start";
pub(crate) const INGEST_END: &str = "tubely.ingest.end";
pub(crate) const INGEST_DURATION: &str = "tubely.ingest.duration";
pub(crate) const INGEST_ORPHAN_REMOVED: &str = "tubely.ingest.orphan-removed";

fn describe_process() {
    metrics::describe_counter!(PROCESS_START, "How many external processes have been started");
    metrics::describe_counter!(PROCESS_END, "How many external processes have completed");
    metrics::describe_histogram!(
        PROCESS_DURATION,
        "Timings for how long external processes took to complete"
    );
}

pub(crate) const PROCESS_START: &str = "tubely.process.start";
pub(crate) const PROCESS_END: &str = "tubely.process.end";
pub(crate) const PROCESS_DURATION: &str = "tubely.process.duration";

fn describe_object_storage() {
    metrics::describe_histogram!(
        OBJECT_STORAGE_PUT,
        "Timings for uploading an object to object storage"
    );
    metrics::describe_histogram!(
        OBJECT_STORAGE_DELETE,
        "Timings for deleting an object from object storage"
    );
    metrics::describe_histogram!(
        OBJECT_STORAGE_SIGN,
        "Timings for signing an object storage URL"
    );
}

pub(crate) const OBJECT_STORAGE_PUT: &str = "tubely.object-storage.put";
pub(crate) const OBJECT_STORAGE_DELETE: &str = "tubely.object-storage.delete";
pub(crate) const OBJECT_STORAGE_SIGN: &str = "tubely.object-storage.sign";

fn describe_repo() {
    metrics::describe_histogram!(REPO_GET_VIDEO, "Timings for reading a video record");
    metrics::describe_histogram!(REPO_UPDATE_VIDEO, "Timings for updating a video record");
    metrics::describe_histogram!(REPO_CREATE_VIDEO, "Timings for creating a video record");
}

pub(crate) const REPO_GET_VIDEO: &str = "tubely.repo.get-video";
pub(crate) const REPO_UPDATE_VIDEO: &str = "tubely.repo.update-video";
pub(crate) const REPO_CREATE_VIDEO: &str = "tubely.repo.create-video";
