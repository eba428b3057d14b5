//! The agent's operations, independent of the HTTP surface.
//!
//! Every operation is stateless with respect to prior calls. Operations that
//! touch several independent targets (directory pairs, data directories,
//! segments) accumulate per-target errors into an [`ErrorList`] instead of
//! stopping at the first failure.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use upgrade_api::requests::{
    ArchiveLogDirectoryRequest, DeleteDataDirectoriesRequest, RenameDirectoriesRequest,
    UpgradePrimariesRequest,
};
use utils::error_list::ErrorList;

use crate::filesystem::{self, Filesystem};
use crate::pg_upgrade::ExecRunner;
use crate::upgrade::upgrade_segment;

pub struct AgentServer {
    fs: Arc<dyn Filesystem>,
    runner: Arc<dyn ExecRunner>,
    host: String,
}

impl AgentServer {
    pub fn new(fs: Arc<dyn Filesystem>, runner: Arc<dyn ExecRunner>, host: String) -> Self {
        AgentServer { fs, runner, host }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn archive_log_directory(&self, request: &ArchiveLogDirectoryRequest) -> anyhow::Result<()> {
        info!("archiving log directory {} to {}", request.old_dir, request.new_dir);

        self.fs
            .rename(&request.old_dir, &request.new_dir)
            .with_context(|| {
                format!("archive log directory {:?} to {:?}", request.old_dir, request.new_dir)
            })
    }

    pub fn rename_directories(&self, request: &RenameDirectoriesRequest) -> anyhow::Result<()> {
        info!("renaming {} directory pairs", request.pairs.len());

        let mut errors = ErrorList::new();
        for pair in &request.pairs {
            if let Err(err) =
                filesystem::archive_source(self.fs.as_ref(), &pair.source, &pair.target, pair.rename_target)
            {
                errors.push(err);
            }
        }
        errors.into_result()
    }

    pub fn delete_data_directories(&self, request: &DeleteDataDirectoriesRequest) -> anyhow::Result<()> {
        info!("deleting {} data directories", request.datadirs.len());

        let mut errors = ErrorList::new();
        for datadir in &request.datadirs {
            let result = filesystem::verify_data_directory(self.fs.as_ref(), datadir).and_then(|()| {
                self.fs
                    .remove_dir_all(datadir)
                    .with_context(|| format!("delete data directory {datadir:?}"))
            });
            if let Err(err) = result {
                errors.push(err);
            }
        }
        errors.into_result()
    }

    pub async fn upgrade_primaries(&self, request: &UpgradePrimariesRequest) -> anyhow::Result<()> {
        let action = if request.check_only { "checking" } else { "upgrading" };
        info!("{action} {} primary segments", request.segments.len());

        let mut errors = ErrorList::new();
        for segment in &request.segments {
            if let Err(err) = upgrade_segment(
                self.fs.clone(),
                self.runner.as_ref(),
                request,
                segment,
                &self.host,
            )
            .await
            {
                errors.push(err);
            }
        }
        errors.into_result()
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Mutex;

    use camino::{Utf8Path, Utf8PathBuf};
    use upgrade_api::requests::RenamePair;

    use super::*;

    /// Every mutation fails with the configured error kind; lookups claim
    /// everything exists.
    struct FailingFs {
        kind: io::ErrorKind,
        message: &'static str,
        renames: Mutex<Vec<(Utf8PathBuf, Utf8PathBuf)>>,
    }

    impl FailingFs {
        fn permission_denied() -> Self {
            FailingFs {
                kind: io::ErrorKind::PermissionDenied,
                message: "permission denied",
                renames: Mutex::new(Vec::new()),
            }
        }

        fn err(&self) -> io::Error {
            io::Error::new(self.kind, self.message)
        }
    }

    impl Filesystem for FailingFs {
        fn rename(&self, from: &Utf8Path, to: &Utf8Path) -> io::Result<()> {
            self.renames
                .lock()
                .unwrap()
                .push((from.to_path_buf(), to.to_path_buf()));
            Err(self.err())
        }

        fn link_exists(&self, _path: &Utf8Path) -> io::Result<bool> {
            Ok(true)
        }

        fn remove(&self, _path: &Utf8Path) -> io::Result<()> {
            Err(self.err())
        }

        fn remove_dir_all(&self, _path: &Utf8Path) -> io::Result<()> {
            Err(self.err())
        }

        fn symlink(&self, _target: &Utf8Path, _link: &Utf8Path) -> io::Result<()> {
            Err(self.err())
        }

        fn copy_tree(&self, _src: &Utf8Path, _dst: &Utf8Path) -> io::Result<()> {
            Err(self.err())
        }

        fn exists(&self, _path: &Utf8Path) -> bool {
            true
        }
    }

    struct PanicRunner;

    #[async_trait::async_trait]
    impl crate::pg_upgrade::ExecRunner for PanicRunner {
        async fn run(
            &self,
            _cmd: crate::pg_upgrade::ExecCommand,
        ) -> Result<(), crate::pg_upgrade::ExecError> {
            panic!("no command expected");
        }
    }

    fn server_with_failing_fs() -> AgentServer {
        AgentServer::new(
            Arc::new(FailingFs::permission_denied()),
            Arc::new(PanicRunner),
            "sdw1".to_string(),
        )
    }

    #[test]
    fn rename_directories_bubbles_up_every_pair_error() {
        let server = server_with_failing_fs();

        let request = RenameDirectoriesRequest {
            pairs: vec![
                RenamePair {
                    source: "/data/dbfast1/seg1".into(),
                    target: "/data/dbfast1_new/seg1".into(),
                    rename_target: true,
                },
                RenamePair {
                    source: "/data/dbfast1/seg3".into(),
                    target: "/data/dbfast1_new/seg3".into(),
                    rename_target: false,
                },
            ],
        };

        let err = server.rename_directories(&request).unwrap_err();
        let list = err.downcast_ref::<ErrorList>().unwrap();
        assert_eq!(list.len(), 2);
        for constituent in list.errors() {
            assert!(format!("{constituent:#}").contains("permission denied"));
        }
    }

    #[test]
    fn delete_data_directories_accumulates_errors() {
        let server = server_with_failing_fs();

        let request = DeleteDataDirectoriesRequest {
            datadirs: vec!["/data/dbfast_mirror1/seg1".into(), "/data/dbfast_mirror1/seg3".into()],
        };

        let err = server.delete_data_directories(&request).unwrap_err();
        let list = err.downcast_ref::<ErrorList>().unwrap();
        assert_eq!(list.len(), 2);
        assert!(list.contains(|e| format!("{e:#}").contains("permission denied")));
    }

    #[test]
    fn archive_log_directory_surfaces_rename_error_verbatim() {
        let server = server_with_failing_fs();

        let request = ArchiveLogDirectoryRequest {
            old_dir: "/home/gpadmin/gpAdminLogs".into(),
            new_dir: "/home/gpadmin/gpAdminLogs-1".into(),
        };

        let err = server.archive_log_directory(&request).unwrap_err();
        assert!(format!("{err:#}").contains("permission denied"));
        assert!(err.downcast_ref::<ErrorList>().is_none());
    }
}
