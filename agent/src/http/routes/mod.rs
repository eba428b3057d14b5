pub(in crate::http) mod archive_log_directory;
pub(in crate::http) mod delete_data_directories;
pub(in crate::http) mod rename_directories;
pub(in crate::http) mod status;
pub(in crate::http) mod upgrade_primaries;
