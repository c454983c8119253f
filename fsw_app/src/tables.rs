//! Sample app tables.
//!
//! **limits**: up to [`MAX_BINS`] `{lo-lim, hi-lim}` bins. Every bin present
//! in the file must be complete, and the whole table is replaced.
//!
//! **params**: name, scale and threshold. The first load must provide all
//! three; later loads may carry any subset and update only those fields.
//!
//! Dumps are pretty-printed JSON in the load format, so a dump can be loaded
//! back unchanged.

use std::fs;
use std::path::Path;

use fsw_common::consts::MAX_TABLE_FILE_LEN;
use fsw_core::error::{TableError, TableResult};
use fsw_core::loader::{Document, ObjDescriptor, ObjectLoader};
use fsw_core::table::{LoadPolicy, LoadType, TableId, TableRegistry, staged_load};
use serde::Serialize;
use tracing::debug;

use crate::config::AppSection;

/// Maximum number of bins in the limits table.
pub const MAX_BINS: usize = 8;

/// Size of the params name field including terminator.
pub const PARAMS_NAME_SIZE: usize = 32;

pub const LIMITS_TABLE_NAME: &str = "SAMPLE.Limits";
pub const PARAMS_TABLE_NAME: &str = "SAMPLE.Params";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Bin {
    #[serde(rename = "lo-lim")]
    pub lo_lim: i32,
    #[serde(rename = "hi-lim")]
    pub hi_lim: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct LimitsTable {
    #[serde(rename = "bin")]
    pub bins: Vec<Bin>,
}

impl LimitsTable {
    /// Index of the first bin containing `value`.
    pub fn classify(&self, value: i32) -> Option<usize> {
        self.bins
            .iter()
            .position(|b| (b.lo_lim..=b.hi_lim).contains(&value))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ParamsTable {
    pub name: String,
    pub scale: f64,
    pub threshold: u32,
}

#[derive(Serialize)]
struct ParamsFile<'a> {
    params: &'a ParamsTable,
}

/// Live contents of every sample app table.
#[derive(Debug, Clone, Default)]
pub struct SampleTables {
    pub limits: LimitsTable,
    pub params: ParamsTable,
    params_loaded: bool,
}

/// Ids assigned at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableIds {
    pub limits: TableId,
    pub params: TableId,
}

/// Register both tables and load their default files.
pub fn register_tables(
    registry: &mut TableRegistry<SampleTables>,
    tables: &mut SampleTables,
    loader: &ObjectLoader,
    config: &AppSection,
) -> TableResult<TableIds> {
    let limits_loader = loader.clone();
    let limits = registry.register_with_default(
        tables,
        LIMITS_TABLE_NAME,
        move |t: &mut SampleTables, load_type: LoadType, path: &Path| {
            debug!(load_type = load_type.as_str(), "loading limits table");
            load_limits(&limits_loader, &mut t.limits, path)
        },
        |t: &SampleTables, path: &Path| dump_json(path, &t.limits),
        &config.limits_table,
    )?;

    let params_loader = loader.clone();
    let params = registry.register_with_default(
        tables,
        PARAMS_TABLE_NAME,
        move |t: &mut SampleTables, load_type: LoadType, path: &Path| {
            debug!(load_type = load_type.as_str(), "loading params table");
            load_params(&params_loader, &mut t.params, t.params_loaded, path)?;
            t.params_loaded = true;
            Ok(())
        },
        |t: &SampleTables, path: &Path| dump_json(path, &ParamsFile { params: &t.params }),
        &config.params_table,
    )?;

    Ok(TableIds { limits, params })
}

/// Load the limits file at `path` into `live`.
pub fn load_limits(loader: &ObjectLoader, live: &mut LimitsTable, path: &Path) -> TableResult<()> {
    staged_load(live, |scratch| {
        loader.process_file(path, MAX_TABLE_FILE_LEN, |doc| {
            scratch.bins = read_bins(loader, doc)?;
            Ok(())
        })
    })
}

fn read_bins(loader: &ObjectLoader, doc: &Document) -> TableResult<Vec<Bin>> {
    let count = (0..=MAX_BINS)
        .take_while(|i| doc.contains(&format!("bin[{i}]")))
        .count();
    if count == 0 {
        return Err(TableError::Validation("limits table defines no bins".into()));
    }
    if count > MAX_BINS {
        return Err(TableError::Validation(format!(
            "limits table defines more than {MAX_BINS} bins"
        )));
    }

    let mut bins = vec![Bin::default(); count];
    let mut descs = Vec::with_capacity(count * 2);
    for (i, bin) in bins.iter_mut().enumerate() {
        descs.push(ObjDescriptor::new(format!("bin[{i}].lo-lim"), &mut bin.lo_lim));
        descs.push(ObjDescriptor::new(format!("bin[{i}].hi-lim"), &mut bin.hi_lim));
    }
    let found = loader.load_object_array(&mut descs, doc);
    let expected = descs.len();
    drop(descs);
    LoadPolicy::AllRequired.check(found, expected, false)?;

    if let Some((i, bin)) = bins.iter().enumerate().find(|(_, b)| b.lo_lim > b.hi_lim) {
        return Err(TableError::Validation(format!(
            "bin[{i}] lo-lim {} above hi-lim {}",
            bin.lo_lim, bin.hi_lim
        )));
    }
    Ok(bins)
}

/// Load the params file at `path` into `live`.
///
/// Once the table has been loaded, absent keys are skipped silently.
pub fn load_params(
    loader: &ObjectLoader,
    live: &mut ParamsTable,
    loaded_before: bool,
    path: &Path,
) -> TableResult<()> {
    staged_load(live, |scratch| {
        loader.process_file(path, MAX_TABLE_FILE_LEN, |doc| {
            let mut descs = [
                ObjDescriptor::string("params.name", &mut scratch.name, PARAMS_NAME_SIZE),
                ObjDescriptor::new("params.scale", &mut scratch.scale),
                ObjDescriptor::new("params.threshold", &mut scratch.threshold),
            ];
            let found = if loaded_before {
                loader.load_object_array_optional(&mut descs, doc)
            } else {
                loader.load_object_array(&mut descs, doc)
            };
            LoadPolicy::PartialAfterFirstLoad.check(found, descs.len(), loaded_before)?;
            drop(descs);

            if !(scratch.scale.is_finite() && scratch.scale > 0.0) {
                return Err(TableError::Validation(format!(
                    "params.scale {} must be positive",
                    scratch.scale
                )));
            }
            Ok(())
        })
    })
}

fn dump_json<V: Serialize>(path: &Path, value: &V) -> TableResult<()> {
    let write_err = |reason: String| TableError::DumpWrite {
        path: path.display().to_string(),
        reason,
    };
    let text = serde_json::to_string_pretty(value).map_err(|e| write_err(e.to_string()))?;
    fs::write(path, text).map_err(|e| write_err(e.to_string()))
}
