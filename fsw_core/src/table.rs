//! Table registry.
//!
//! A table is a block of app configuration loaded from a file at start-up
//! and replaceable by ground command. The registry owns the load/dump
//! callbacks and the status bookkeeping; the table contents live in the
//! app's own state (`T`), which every load and dump receives explicitly.
//!
//! Slots are allocated in registration order and never freed, so a
//! [`TableId`] is stable for the life of the registry.

mod staged;

use std::fs;
use std::path::Path;

use fsw_common::consts::{FILENAME_FIELD_LEN, MAX_TABLES_PER_APP};
use fsw_common::events::{EventKind, SharedSink, eid};
use serde::Serialize;
use static_assertions::const_assert;

use crate::error::{MsgError, TableError, TableResult};
use crate::msg::{CmdView, read_fixed_str, write_fixed_str};

pub use staged::{LoadPolicy, staged_load};

/// Index of a registered table.
pub type TableId = u8;

/// Payload length of the load table command.
pub const LOAD_TBL_CMD_LEN: usize = 2 + FILENAME_FIELD_LEN;
/// Payload length of the dump table command.
pub const DUMP_TBL_CMD_LEN: usize = LOAD_TBL_CMD_LEN;

const_assert!(MAX_TABLES_PER_APP <= TableId::MAX as usize);

/// How a load applies to existing table contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[repr(u8)]
pub enum LoadType {
    /// Replace the whole table.
    #[default]
    Replace = 0,
    /// Update the objects present in the file.
    Update = 1,
}

impl LoadType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Replace => "Replace",
            Self::Update => "Update",
        }
    }
}

impl TryFrom<u8> for LoadType {
    type Error = TableError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Replace),
            1 => Ok(Self::Update),
            other => Err(TableError::InvalidLoadType(other)),
        }
    }
}

/// Most recent action on a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum TableAction {
    #[default]
    None,
    Load,
    Dump,
    Register,
}

impl TableAction {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::None => "Undefined",
            Self::Load => "Load",
            Self::Dump => "Dump",
            Self::Register => "Register",
        }
    }
}

/// Outcome of the most recent action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ActionStatus {
    #[default]
    Invalid,
    Valid,
}

impl ActionStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Invalid => "Invalid",
            Self::Valid => "Valid",
        }
    }

    const fn from_ok(ok: bool) -> Self {
        if ok { Self::Valid } else { Self::Invalid }
    }
}

/// Read-only view of one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableStatus {
    pub id: TableId,
    pub name: String,
    pub loaded: bool,
    pub last_action: TableAction,
    pub last_action_status: ActionStatus,
    /// File used by the last load or dump.
    pub filename: String,
}

/// App callback that loads `path` into the owner's table.
pub type LoadFn<T> = Box<dyn FnMut(&mut T, LoadType, &Path) -> TableResult<()> + Send>;

/// App callback that writes the owner's table to `path`.
pub type DumpFn<T> = Box<dyn FnMut(&T, &Path) -> TableResult<()> + Send>;

struct TableSlot<T> {
    name: String,
    loaded: bool,
    last_action: TableAction,
    last_action_status: ActionStatus,
    filename: String,
    load_fn: LoadFn<T>,
    dump_fn: DumpFn<T>,
}

/// Registry of an app's tables.
pub struct TableRegistry<T> {
    slots: heapless::Vec<TableSlot<T>, MAX_TABLES_PER_APP>,
    last_id: Option<TableId>,
    events: SharedSink,
}

impl<T> TableRegistry<T> {
    pub fn new(events: SharedSink) -> Self {
        Self {
            slots: heapless::Vec::new(),
            last_id: None,
            events,
        }
    }

    /// Allocate the next slot.
    pub fn register<L, D>(&mut self, name: &str, load_fn: L, dump_fn: D) -> TableResult<TableId>
    where
        L: FnMut(&mut T, LoadType, &Path) -> TableResult<()> + Send + 'static,
        D: FnMut(&T, &Path) -> TableResult<()> + Send + 'static,
    {
        let id = self.slots.len() as TableId;
        let slot = TableSlot {
            name: name.to_owned(),
            loaded: false,
            last_action: TableAction::Register,
            last_action_status: ActionStatus::Valid,
            filename: String::new(),
            load_fn: Box::new(load_fn),
            dump_fn: Box::new(dump_fn),
        };
        if self.slots.push(slot).is_err() {
            let err = TableError::RegistryFull {
                max: MAX_TABLES_PER_APP,
            };
            self.events.send(
                eid::TBL_REGISTRY_FULL,
                EventKind::Error,
                &format!("Error registering table {name}: {err}"),
            );
            return Err(err);
        }

        self.last_id = Some(id);
        self.events.send(
            eid::TBL_REGISTER,
            EventKind::Debug,
            &format!("Registered table {name} with id {id}"),
        );
        Ok(id)
    }

    /// Register, then load `path` with [`LoadType::Replace`].
    ///
    /// Only a registration failure is returned. The outcome of the default
    /// load is reported and recorded in the table's status.
    pub fn register_with_default<L, D>(
        &mut self,
        owner: &mut T,
        name: &str,
        load_fn: L,
        dump_fn: D,
        path: &Path,
    ) -> TableResult<TableId>
    where
        L: FnMut(&mut T, LoadType, &Path) -> TableResult<()> + Send + 'static,
        D: FnMut(&T, &Path) -> TableResult<()> + Send + 'static,
    {
        let id = self.register(name, load_fn, dump_fn)?;
        self.load_command(owner, id, path, LoadType::Replace);
        Ok(id)
    }

    /// Load `path` into table `id` without reporting.
    ///
    /// An unknown id changes nothing. Any other failure records
    /// `Load`/`Invalid` in the slot.
    pub fn load(
        &mut self,
        owner: &mut T,
        id: TableId,
        path: &Path,
        load_type: LoadType,
    ) -> TableResult<()> {
        let slot = self
            .slots
            .get_mut(usize::from(id))
            .ok_or(TableError::UnknownId(id))?;
        self.last_id = Some(id);
        slot.last_action = TableAction::Load;
        slot.filename = path.display().to_string();

        let result = match fs::File::open(path) {
            Ok(_) => (slot.load_fn)(owner, load_type, path),
            Err(e) => Err(TableError::FileNotReadable {
                path: slot.filename.clone(),
                reason: e.to_string(),
            }),
        };
        slot.last_action_status = ActionStatus::from_ok(result.is_ok());
        if result.is_ok() {
            slot.loaded = true;
        }
        result
    }

    /// Load and report. Returns `true` on success.
    pub fn load_command(
        &mut self,
        owner: &mut T,
        id: TableId,
        path: &Path,
        load_type: LoadType,
    ) -> bool {
        match self.load(owner, id, path, load_type) {
            Ok(()) => {
                self.events.send(
                    eid::TBL_LOAD,
                    EventKind::Info,
                    &format!(
                        "{} table {} loaded from {}",
                        load_type.as_str(),
                        self.name(id).unwrap_or_default(),
                        path.display()
                    ),
                );
                true
            }
            Err(e) => {
                self.report_failure(id, eid::TBL_LOAD_ERR, "load", &e);
                false
            }
        }
    }

    /// Dump table `id` to `path` without reporting.
    ///
    /// The parent directory of `path` must exist and be writable.
    pub fn dump(&mut self, owner: &T, id: TableId, path: &Path) -> TableResult<()> {
        let slot = self
            .slots
            .get_mut(usize::from(id))
            .ok_or(TableError::UnknownId(id))?;
        self.last_id = Some(id);
        slot.last_action = TableAction::Dump;
        slot.filename = path.display().to_string();

        let result = if dir_writable(path) {
            (slot.dump_fn)(owner, path)
        } else {
            Err(TableError::DirNotWritable {
                path: slot.filename.clone(),
            })
        };
        slot.last_action_status = ActionStatus::from_ok(result.is_ok());
        result
    }

    /// Dump and report. Returns `true` on success.
    pub fn dump_command(&mut self, owner: &T, id: TableId, path: &Path) -> bool {
        match self.dump(owner, id, path) {
            Ok(()) => {
                self.events.send(
                    eid::TBL_DUMP,
                    EventKind::Info,
                    &format!(
                        "Table {} dumped to {}",
                        self.name(id).unwrap_or_default(),
                        path.display()
                    ),
                );
                true
            }
            Err(e) => {
                self.report_failure(id, eid::TBL_DUMP_ERR, "dump", &e);
                false
            }
        }
    }

    /// Command handler body for the load table command.
    pub fn load_cmd(&mut self, owner: &mut T, buf: &[u8]) -> bool {
        match decode_payload(buf).and_then(LoadTblCmd::decode) {
            Ok(cmd) => self.load_command(owner, cmd.id, Path::new(&cmd.filename), cmd.load_type),
            Err(e) => {
                self.report_cmd_error("load", &e);
                false
            }
        }
    }

    /// Command handler body for the dump table command.
    pub fn dump_cmd(&mut self, owner: &T, buf: &[u8]) -> bool {
        match decode_payload(buf).and_then(DumpTblCmd::decode) {
            Ok(cmd) => self.dump_command(owner, cmd.id, Path::new(&cmd.filename)),
            Err(e) => {
                self.report_cmd_error("dump", &e);
                false
            }
        }
    }

    fn report_failure(&self, id: TableId, load_or_dump_eid: u16, verb: &str, err: &TableError) {
        let event_id = match err {
            TableError::UnknownId(_) => eid::TBL_INVALID_ID,
            _ => load_or_dump_eid,
        };
        let name = self.name(id).unwrap_or("?");
        self.events.send(
            event_id,
            EventKind::Error,
            &format!("Table {verb} failed for id {id} ({name}): {err}"),
        );
    }

    fn report_cmd_error(&self, verb: &str, err: &TableError) {
        self.events.send(
            eid::TBL_CMD_ERR,
            EventKind::Error,
            &format!("Rejected {verb} table command: {err}"),
        );
    }

    pub fn get_status(&self, id: TableId) -> Option<TableStatus> {
        self.slots.get(usize::from(id)).map(|slot| TableStatus {
            id,
            name: slot.name.clone(),
            loaded: slot.loaded,
            last_action: slot.last_action,
            last_action_status: slot.last_action_status,
            filename: slot.filename.clone(),
        })
    }

    /// Table most recently registered, loaded or dumped.
    pub const fn last_table_id(&self) -> Option<TableId> {
        self.last_id
    }

    pub fn last_table_status(&self) -> Option<TableStatus> {
        self.last_id.and_then(|id| self.get_status(id))
    }

    /// Clear last-action bookkeeping. Loaded state is kept.
    pub fn reset_status(&mut self) {
        self.last_id = None;
        for slot in &mut self.slots {
            slot.last_action = TableAction::None;
            slot.last_action_status = ActionStatus::Invalid;
        }
    }

    pub fn name(&self, id: TableId) -> Option<&str> {
        self.slots.get(usize::from(id)).map(|slot| slot.name.as_str())
    }

    pub fn find(&self, name: &str) -> Option<TableId> {
        self.slots
            .iter()
            .position(|slot| slot.name == name)
            .map(|i| i as TableId)
    }

    pub fn is_loaded(&self, id: TableId) -> bool {
        self.slots
            .get(usize::from(id))
            .is_some_and(|slot| slot.loaded)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

fn dir_writable(path: &Path) -> bool {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::metadata(dir).is_ok_and(|m| m.is_dir() && !m.permissions().readonly())
}

fn decode_payload(buf: &[u8]) -> TableResult<&[u8]> {
    Ok(CmdView::parse(buf)?.payload())
}

fn check_len(payload: &[u8], expected: usize) -> Result<(), MsgError> {
    if payload.len() < expected {
        return Err(MsgError::PayloadTooShort {
            len: payload.len(),
            expected,
        });
    }
    Ok(())
}

/// Load table command payload: `[id][load type][filename; 64]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTblCmd {
    pub id: TableId,
    pub load_type: LoadType,
    pub filename: String,
}

impl LoadTblCmd {
    pub fn decode(payload: &[u8]) -> TableResult<Self> {
        check_len(payload, LOAD_TBL_CMD_LEN)?;
        Ok(Self {
            id: payload[0],
            load_type: LoadType::try_from(payload[1])?,
            filename: read_fixed_str(&payload[2..LOAD_TBL_CMD_LEN])?.to_owned(),
        })
    }

    pub fn encode(&self) -> Result<[u8; LOAD_TBL_CMD_LEN], MsgError> {
        let mut out = [0u8; LOAD_TBL_CMD_LEN];
        out[0] = self.id;
        out[1] = self.load_type as u8;
        write_fixed_str(&mut out[2..], &self.filename)?;
        Ok(out)
    }
}

/// Dump table command payload: `[id][spare][filename; 64]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpTblCmd {
    pub id: TableId,
    pub filename: String,
}

impl DumpTblCmd {
    pub fn decode(payload: &[u8]) -> TableResult<Self> {
        check_len(payload, DUMP_TBL_CMD_LEN)?;
        Ok(Self {
            id: payload[0],
            filename: read_fixed_str(&payload[2..DUMP_TBL_CMD_LEN])?.to_owned(),
        })
    }

    pub fn encode(&self) -> Result<[u8; DUMP_TBL_CMD_LEN], MsgError> {
        let mut out = [0u8; DUMP_TBL_CMD_LEN];
        out[0] = self.id;
        write_fixed_str(&mut out[2..], &self.filename)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msg::CmdPacket;
    use fsw_common::events::MemorySink;

    #[derive(Default)]
    struct Owner {
        value: String,
        loads: u32,
    }

    fn registry() -> (TableRegistry<Owner>, std::sync::Arc<MemorySink>) {
        let sink = MemorySink::new();
        (TableRegistry::new(sink.clone()), sink)
    }

    fn register_text(reg: &mut TableRegistry<Owner>, name: &str) -> TableId {
        reg.register(
            name,
            |o: &mut Owner, _: LoadType, p: &Path| {
                o.value = fs::read_to_string(p).map_err(|e| TableError::Validation(e.to_string()))?;
                o.loads += 1;
                Ok(())
            },
            |o: &Owner, p: &Path| {
                fs::write(p, &o.value).map_err(|e| TableError::DumpWrite {
                    path: p.display().to_string(),
                    reason: e.to_string(),
                })
            },
        )
        .unwrap()
    }

    #[test]
    fn ids_are_sequential_and_pool_is_bounded() {
        let (mut reg, sink) = registry();
        for i in 0..MAX_TABLES_PER_APP {
            assert_eq!(register_text(&mut reg, &format!("t{i}")), i as TableId);
        }
        let err = reg
            .register("extra", |_: &mut Owner, _: LoadType, _: &Path| Ok(()), |_: &Owner, _: &Path| Ok(()))
            .unwrap_err();
        assert_eq!(err, TableError::RegistryFull { max: MAX_TABLES_PER_APP });
        assert!(sink.contains(eid::TBL_REGISTRY_FULL));
        assert_eq!(reg.len(), MAX_TABLES_PER_APP);
        assert_eq!(reg.find("t2"), Some(2));
    }

    #[test]
    fn load_records_status() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "hello").unwrap();

        let (mut reg, sink) = registry();
        let mut owner = Owner::default();
        let id = register_text(&mut reg, "text");

        assert!(reg.load_command(&mut owner, id, &path, LoadType::Replace));
        assert_eq!(owner.value, "hello");
        let status = reg.get_status(id).unwrap();
        assert!(status.loaded);
        assert_eq!(status.last_action, TableAction::Load);
        assert_eq!(status.last_action_status, ActionStatus::Valid);
        assert_eq!(status.filename, path.display().to_string());
        assert!(sink.contains(eid::TBL_LOAD));
    }

    #[test]
    fn unknown_id_changes_nothing() {
        let (mut reg, sink) = registry();
        let mut owner = Owner::default();
        let id = register_text(&mut reg, "text");
        let before = reg.get_status(id);

        assert!(!reg.load_command(&mut owner, 3, Path::new("/tmp/x"), LoadType::Replace));
        assert_eq!(reg.get_status(id), before);
        assert_eq!(reg.last_table_id(), Some(id));
        assert!(sink.contains(eid::TBL_INVALID_ID));
    }

    #[test]
    fn unreadable_file_marks_load_invalid() {
        let (mut reg, sink) = registry();
        let mut owner = Owner::default();
        let id = register_text(&mut reg, "text");

        assert!(!reg.load_command(&mut owner, id, Path::new("/nonexistent/t.json"), LoadType::Update));
        let status = reg.get_status(id).unwrap();
        assert_eq!(status.last_action, TableAction::Load);
        assert_eq!(status.last_action_status, ActionStatus::Invalid);
        assert!(!status.loaded);
        assert_eq!(owner.loads, 0);
        assert!(sink.contains(eid::TBL_LOAD_ERR));
    }

    #[test]
    fn dump_requires_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let (mut reg, sink) = registry();
        let owner = Owner {
            value: "state".into(),
            loads: 0,
        };
        let id = register_text(&mut reg, "text");

        let good = dir.path().join("dump.txt");
        assert!(reg.dump_command(&owner, id, &good));
        assert_eq!(fs::read_to_string(&good).unwrap(), "state");

        let bad = dir.path().join("missing").join("dump.txt");
        assert_eq!(
            reg.dump(&owner, id, &bad),
            Err(TableError::DirNotWritable {
                path: bad.display().to_string()
            })
        );
        assert_eq!(reg.get_status(id).unwrap().last_action_status, ActionStatus::Invalid);
        assert!(!reg.dump_command(&owner, id, &bad));
        assert!(sink.contains(eid::TBL_DUMP_ERR));
    }

    #[test]
    fn load_cmd_decodes_packet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.txt");
        fs::write(&path, "from cmd").unwrap();

        let (mut reg, _) = registry();
        let mut owner = Owner::default();
        let id = register_text(&mut reg, "text");

        let payload = LoadTblCmd {
            id,
            load_type: LoadType::Replace,
            filename: path.display().to_string(),
        }
        .encode()
        .unwrap();
        let pkt = CmdPacket::build(0x1880, 2, &payload).unwrap();
        assert!(reg.load_cmd(&mut owner, &pkt));
        assert_eq!(owner.value, "from cmd");
    }

    #[test]
    fn bad_load_type_rejected() {
        let (mut reg, sink) = registry();
        let mut owner = Owner::default();
        register_text(&mut reg, "text");

        let mut payload = LoadTblCmd {
            id: 0,
            load_type: LoadType::Replace,
            filename: "x".into(),
        }
        .encode()
        .unwrap();
        payload[1] = 7;
        let pkt = CmdPacket::build(0x1880, 2, &payload).unwrap();
        assert!(!reg.load_cmd(&mut owner, &pkt));
        assert!(sink.contains(eid::TBL_CMD_ERR));
    }

    #[test]
    fn reset_keeps_loaded_flag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.txt");
        fs::write(&path, "x").unwrap();

        let (mut reg, _) = registry();
        let mut owner = Owner::default();
        let id = register_text(&mut reg, "text");
        reg.load(&mut owner, id, &path, LoadType::Replace).unwrap();

        assert_eq!(reg.last_table_status().map(|s| s.id), Some(id));

        reg.reset_status();
        assert!(reg.is_loaded(id));
        assert!(reg.last_table_status().is_none());
        let status = reg.get_status(id).unwrap();
        assert!(status.loaded);
        assert_eq!(status.last_action, TableAction::None);
        assert_eq!(reg.last_table_id(), None);
    }

    #[test]
    fn display_strings() {
        assert_eq!(LoadType::Update.as_str(), "Update");
        assert_eq!(TableAction::None.as_str(), "Undefined");
        assert_eq!(ActionStatus::Valid.as_str(), "Valid");
        assert_eq!(LoadType::try_from(2), Err(TableError::InvalidLoadType(2)));
    }
}
