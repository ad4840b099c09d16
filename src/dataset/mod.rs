pub mod io;
pub mod naming;
pub mod processing;
pub mod snapshot;
pub mod split;

pub use io::{folder_names, is_valid_directory, is_valid_file, load_table, save_table};
pub use naming::new_snapshot_id;
pub use processing::{
    LabelEncoding, NormalisationMethod, NormalisationState, encode_labels,
    encode_labels_with_mapping, normalize, normalize_with_state,
};
pub use snapshot::{
    SnapshotManifest, SnapshotProvenance, list_snapshots, load_snapshot, persist_snapshot,
    read_manifest,
};
pub use split::{SplitDataset, split};
