pub mod mount;

pub use mount::{
    apply_mount_propagation, parse_mount_options, propagation_flag, ParsedMountOptions,
};
