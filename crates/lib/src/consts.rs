//! Crate-wide constants.

pub const APP_NAME: &str = "strata";

/// Length of the truncated hex digest used for derived layer identities.
pub const OBJ_HASH_PREFIX_LEN: usize = 20;

/// On-disk format of every layer, tag and instance disk.
pub const DISK_FORMAT: &str = "qcow2";

pub const LAYERS_DIR: &str = "layers";
pub const TAGS_DIR: &str = "tags";
pub const INSTANCES_DIR: &str = "instances";
pub const LOCKS_DIR: &str = "locks";

/// Extension of the marker written next to a layer while it is being built.
pub const INCOMPLETE_EXT: &str = "incomplete";

/// Extension of the file next to an instance disk that names its backing tag.
pub const INSTANCE_TAG_EXT: &str = "tag";

/// Default script file name looked up by the CLI.
pub const DEFAULT_SCRIPT: &str = "Stratafile";
