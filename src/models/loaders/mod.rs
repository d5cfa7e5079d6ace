pub mod toml_loader;

pub use toml_loader::{load_all_job_seeds, load_answer_bank, load_job_seeds, JobSeed};
