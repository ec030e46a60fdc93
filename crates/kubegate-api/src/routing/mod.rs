//! Path utilities for cluster-addressed requests

mod path;

pub use path::{strip_cluster_prefix, upstream_uri, CLUSTER_PATH_PREFIX};
