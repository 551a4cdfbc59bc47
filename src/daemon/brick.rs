//! Brick server daemons

use crate::common::BrickConfig;
use crate::daemon::DaemonHandle;
use crate::store::Brick;
use uuid::Uuid;

/// File-safe form of a brick path: `/data/b1` -> `data-b1`
fn path_id(path: &str) -> String {
    path.trim_matches('/').replace('/', "-")
}

/// Build the daemon handle for one brick of `volname` owned by `node_id`.
pub fn brick_daemon(
    volname: &str,
    brick: &Brick,
    node_id: Uuid,
    cfg: &BrickConfig,
) -> DaemonHandle {
    let id = format!("{}-{}-{}", volname, brick.hostname, path_id(&brick.path));
    let pidfile = cfg.run_dir.join(format!("{}.pid", id));
    let socket = cfg.run_dir.join(format!("{}.socket", id));
    let logfile = cfg.log_dir.join(format!("{}.log", id));

    let args = vec![
        "--volfile-id".to_string(),
        format!("{}.{}.{}", volname, brick.hostname, path_id(&brick.path)),
        "-p".to_string(),
        pidfile.display().to_string(),
        "-S".to_string(),
        socket.display().to_string(),
        "--brick-name".to_string(),
        brick.path.clone(),
        "-l".to_string(),
        logfile.display().to_string(),
        "--xlator-option".to_string(),
        format!("*-posix.glusterd-uuid={}", node_id),
    ];

    DaemonHandle {
        name: format!("brick {}", brick.display_name()),
        binary: cfg.binary.clone(),
        args,
        pidfile,
    }
}
