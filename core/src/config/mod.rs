mod load;
mod types;

pub use load::{get_crewline_data_dir, load_default, load_from_path};
pub use types::*;
