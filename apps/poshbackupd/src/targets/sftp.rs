use std::fs::File;
use std::io::Read;
use std::net::TcpStream;
use std::path::Path;

use serde::{Deserialize, Serialize};
use ssh2::Session;

use super::{RemoteTarget, TargetError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SftpTargetSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub remote_path: String,
    pub private_key_path: Option<String>,
}

/// Transfers archives over SFTP. Authentication prefers a configured
/// private key; falls back to ssh-agent, matching how most PoSh-Backup
/// deployments authenticate non-interactively against a backup host.
pub struct SftpTarget {
    name: String,
    settings: SftpTargetSettings,
}

impl SftpTarget {
    pub fn new(name: impl Into<String>, settings: SftpTargetSettings) -> Self {
        SftpTarget { name: name.into(), settings }
    }

    fn connect(&self) -> Result<Session, TargetError> {
        let address = format!("{}:{}", self.settings.host, self.settings.port);
        let tcp = TcpStream::connect(&address).map_err(|e| TargetError::ConnectFailed {
            name: self.name.clone(),
            message: e.to_string(),
        })?;

        let mut session = Session::new().map_err(|e| TargetError::ConnectFailed {
            name: self.name.clone(),
            message: e.to_string(),
        })?;
        session.set_tcp_stream(tcp);
        session.handshake().map_err(|e| TargetError::ConnectFailed {
            name: self.name.clone(),
            message: e.to_string(),
        })?;

        if let Some(key_path) = &self.settings.private_key_path {
            session
                .userauth_pubkey_file(&self.settings.username, None, Path::new(key_path), None)
                .map_err(|e| TargetError::ConnectFailed { name: self.name.clone(), message: e.to_string() })?;
        } else {
            session
                .userauth_agent(&self.settings.username)
                .map_err(|e| TargetError::ConnectFailed { name: self.name.clone(), message: e.to_string() })?;
        }

        if !session.authenticated() {
            return Err(TargetError::ConnectFailed {
                name: self.name.clone(),
                message: "authentication did not succeed".to_string(),
            });
        }

        Ok(session)
    }
}

impl RemoteTarget for SftpTarget {
    fn name(&self) -> &str {
        &self.name
    }

    fn transfer(&self, local_archive_path: &str) -> Result<(), TargetError> {
        let session = self.connect()?;
        let sftp = session.sftp().map_err(|e| TargetError::TransferFailed {
            name: self.name.clone(),
            file: local_archive_path.to_string(),
            message: e.to_string(),
        })?;

        let file_name = Path::new(local_archive_path)
            .file_name()
            .ok_or_else(|| TargetError::InvalidSettings {
                name: self.name.clone(),
                message: "local archive path has no file name".to_string(),
            })?;
        let remote_path = Path::new(&self.settings.remote_path).join(file_name);

        let mut local_file = File::open(local_archive_path).map_err(|e| TargetError::TransferFailed {
            name: self.name.clone(),
            file: local_archive_path.to_string(),
            message: e.to_string(),
        })?;

        let mut remote_file = sftp.create(&remote_path).map_err(|e| TargetError::TransferFailed {
            name: self.name.clone(),
            file: local_archive_path.to_string(),
            message: e.to_string(),
        })?;

        let mut buffer = Vec::new();
        local_file.read_to_end(&mut buffer).map_err(|e| TargetError::TransferFailed {
            name: self.name.clone(),
            file: local_archive_path.to_string(),
            message: e.to_string(),
        })?;

        std::io::Write::write_all(&mut remote_file, &buffer).map_err(|e| TargetError::TransferFailed {
            name: self.name.clone(),
            file: local_archive_path.to_string(),
            message: e.to_string(),
        })
    }

    fn list_remote_archives(&self, base_name_prefix: &str) -> Result<Vec<String>, TargetError> {
        let session = self.connect()?;
        let sftp = session.sftp().map_err(|e| TargetError::ListFailed {
            name: self.name.clone(),
            message: e.to_string(),
        })?;

        let entries = sftp
            .readdir(Path::new(&self.settings.remote_path))
            .map_err(|e| TargetError::ListFailed { name: self.name.clone(), message: e.to_string() })?;

        Ok(entries
            .into_iter()
            .filter_map(|(path, _stat)| {
                let file_name = path.file_name()?.to_str()?.to_string();
                if file_name.starts_with(base_name_prefix) {
                    Some(path.to_string_lossy().to_string())
                } else {
                    None
                }
            })
            .collect())
    }

    fn delete_remote_archive(&self, remote_path: &str) -> Result<(), TargetError> {
        let session = self.connect()?;
        let sftp = session.sftp().map_err(|e| TargetError::DeleteFailed {
            name: self.name.clone(),
            file: remote_path.to_string(),
            message: e.to_string(),
        })?;
        sftp.unlink(Path::new(remote_path)).map_err(|e| TargetError::DeleteFailed {
            name: self.name.clone(),
            file: remote_path.to_string(),
            message: e.to_string(),
        })
    }
}
