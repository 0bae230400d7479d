//! Directory listing and deletion.

use log::{debug, info};

use crate::error::Result;
use crate::port::Port;
use crate::protocol::address::{Bank, Key};
use crate::protocol::codec::{Command, DeviceError, Entry, Response};
use crate::protocol::name::FileName;
use crate::session::Session;

impl<P: Port> Session<P> {
    /// List `bank/key`.
    ///
    /// Returns `Ok(None)` when the directory does not exist, which is
    /// distinct from an existing empty directory.
    pub fn list(&mut self, bank: Bank, key: Key) -> Result<Option<Vec<Entry>>> {
        self.send(&Command::List { bank, key })?;

        let timeout = self.config().command_timeout;
        let mut entries = Vec::new();
        loop {
            match self.next_response(timeout, "LS:DONE")? {
                Response::Entry(entry) => entries.push(entry),
                Response::ListDone => break,
                Response::Error(DeviceError::NoDir) => {
                    debug!("LS {bank}/{key}: no such directory");
                    return Ok(None);
                },
                Response::Error(e) => return Err(e.into()),
                other => return Err(self.unexpected(&other, "LS:DONE")),
            }
        }
        debug!("LS {bank}/{key}: {} entries", entries.len());
        Ok(Some(entries))
    }

    /// Delete `bank/key/name`.
    ///
    /// Returns `false` if the file did not exist.
    pub fn delete(&mut self, bank: Bank, key: Key, name: &FileName) -> Result<bool> {
        self.send(&Command::Delete { bank, key, name })?;

        let timeout = self.config().command_timeout;
        match self.next_response(timeout, "DEL:OK")? {
            Response::DeleteOk => {
                info!("Deleted {bank}/{key}/{name}");
                Ok(true)
            },
            Response::Error(DeviceError::NotFound(_)) => {
                debug!("DEL {bank}/{key}/{name}: not found");
                Ok(false)
            },
            Response::Error(e) => Err(e.into()),
            other => Err(self.unexpected(&other, "DEL:OK")),
        }
    }
}
