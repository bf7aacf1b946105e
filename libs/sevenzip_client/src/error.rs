use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("archive path must not be empty")]
    EmptyArchivePath,
}

#[derive(Debug, Error)]
pub enum SevenZipError {
    #[error("7-Zip could not be launched: {0}")]
    LaunchFailed(String),
    #[error("7-Zip exited with code {code} after {attempts} attempt(s)")]
    NonZeroExit { code: i32, attempts: u32 },
}

#[derive(Debug, Error)]
pub enum TestError {
    #[error("archive test exited with code {0}")]
    NonZeroExit(i32),
}
