pub mod archive_sink_adapter;
pub mod snapshot_archive;
