//! System-wide constants and default paths.

/// Binary name for the CLI.
pub const BIN_NAME: &str = "bastion";

/// Environment variable that overrides the working root.
pub const ROOT_ENV_VAR: &str = "BASTION_ROOT";

/// Environment variable holding the default dispatch timeout, in seconds.
pub const DISPATCH_TIMEOUT_ENV_VAR: &str = "BASTION_DISPATCH_TIMEOUT";

/// Working root used when [`ROOT_ENV_VAR`] is unset, in its raw form.
pub const DEFAULT_RAW_ROOT: &str = "~/.bastion";

/// Name of the reserved directory under the root for internal files.
pub const PRIVATE_DIR_NAME: &str = ".private";

/// File in the private area holding the instance identifier.
pub const GUID_FILE_NAME: &str = "guids.txt";

/// Environment variables consulted, in order, to expand a leading `~`.
pub const HOME_ENV_VARS: [&str; 2] = ["HOME", "USERPROFILE"];

/// Name given to thread-mode dispatch workers.
pub const DISPATCH_THREAD_NAME: &str = "bastion-dispatch";

/// Upper bound on descriptors swept one by one when the kernel cannot flag
/// a whole range at once.
pub const MAX_INHERITED_FD_SWEEP: i32 = 65_536;
