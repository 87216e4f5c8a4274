pub const DEFAULT_NODE_PATH: &str = "node";
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_MEMORY_MB: u64 = 256;
pub const DEFAULT_MAX_OUTPUT_BYTES: u64 = 1024 * 1024;

pub const NODE_PATH_VAR: &str = "GRADER_NODE_PATH";
pub const TIMEOUT_MS_VAR: &str = "GRADER_TIMEOUT_MS";
pub const MEMORY_MB_VAR: &str = "GRADER_MEMORY_MB";
pub const MAX_OUTPUT_BYTES_VAR: &str = "GRADER_MAX_OUTPUT_BYTES";
