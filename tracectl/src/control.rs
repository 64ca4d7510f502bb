// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Tracing runtime control.

use ordermap::OrderMap;
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, OnceLock};
use thiserror::Error;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, Registry, filter::LevelFilter, prelude::*, reload};

use crate::{targets::TRACING_TARGETS, trace_target};

trace_target!("tracectl", LevelFilter::INFO, &[]);

/// Errors when changing the tracing configuration.
#[derive(Debug, Error, PartialEq)]
pub enum TraceCtlError {
    #[error("Invalid syntax '{0}': expected tag=level")]
    Syntax(String),
    #[error("Invalid level '{0}'")]
    Level(String),
    #[error("Unknown tag '{0}'")]
    UnknownTag(String),
}

#[derive(Debug, Clone)]
pub struct TargetCfg {
    pub target: &'static str,
    pub name: &'static str,
    pub level: LevelFilter,
    pub tags: Vec<&'static str>,
}

#[derive(Debug)]
struct TargetDb {
    default: LevelFilter,
    targets: OrderMap<&'static str, TargetCfg>,
    tags: OrderMap<&'static str, HashSet<&'static str>>,
}

impl TargetDb {
    fn load(default: LevelFilter) -> Self {
        let mut db = Self {
            default,
            targets: OrderMap::new(),
            tags: OrderMap::new(),
        };
        for t in TRACING_TARGETS {
            db.register(t.target, t.name, t.level, t.tags);
        }
        db
    }
    fn register(
        &mut self,
        target: &'static str,
        name: &'static str,
        level: LevelFilter,
        tags: &'static [&'static str],
    ) {
        // a target can always be addressed by its name
        let mut tags = tags.to_vec();
        if !tags.contains(&name) {
            tags.push(name);
        }
        for tag in &tags {
            self.tags.entry(*tag).or_default().insert(target);
        }
        let cfg = TargetCfg {
            target,
            name,
            level,
            tags,
        };
        if self.targets.insert(target, cfg).is_some() {
            warn!("Tracing target {target} declared more than once");
        }
    }
    fn env_filter(&self) -> EnvFilter {
        self.targets
            .values()
            .filter_map(|t| format!("{}={}", t.target, t.level).parse().ok())
            .fold(EnvFilter::new(self.default.to_string()), |f, directive| {
                f.add_directive(directive)
            })
    }
    fn set_tag_level(&mut self, tag: &str, level: LevelFilter) -> Result<usize, TraceCtlError> {
        let targets = self
            .tags
            .get(tag)
            .ok_or_else(|| TraceCtlError::UnknownTag(tag.to_owned()))?;
        let mut changed = 0;
        for target in targets {
            if let Some(cfg) = self.targets.get_mut(target)
                && cfg.level != level
            {
                cfg.level = level;
                changed += 1;
            }
        }
        Ok(changed)
    }
    fn as_config_string(&self) -> String {
        let mut out = format!("default={}", self.default);
        for t in self.targets.values() {
            out += &format!(",{}={}", t.name, t.level);
        }
        out
    }
}

/// Owner of the process-wide subscriber and of the per-target levels.
#[derive(Debug)]
pub struct TracingControl {
    db: Mutex<TargetDb>,
    reload_filter: reload::Handle<EnvFilter, Registry>,
}

static TRACING_CTL: OnceLock<TracingControl> = OnceLock::new();

/// Get the process-wide [`TracingControl`], installing the subscriber on first use.
pub fn get_trace_ctl() -> &'static TracingControl {
    TRACING_CTL.get_or_init(TracingControl::new)
}

impl TracingControl {
    fn new() -> Self {
        let db = TargetDb::load(LevelFilter::INFO);
        let (filter, reload_filter) = reload::Layer::new(db.env_filter());
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_line_number(true)
            .with_target(true)
            .with_thread_names(true)
            .with_level(true);
        if let Err(e) = tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
        {
            // another subscriber won (e.g. a test harness): levels are still tracked
            eprintln!("tracing subscriber already installed: {e}");
        }
        Self {
            db: Mutex::new(db),
            reload_filter,
        }
    }
    fn db(&self) -> MutexGuard<'_, TargetDb> {
        self.db.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
    fn reload(&self, db: &TargetDb) {
        if let Err(e) = self.reload_filter.reload(db.env_filter()) {
            error!("Failed to reload tracing filter: {e}");
        }
    }

    /// Install the subscriber. Calling this more than once is harmless.
    pub fn init() {
        get_trace_ctl();
    }

    pub fn default_level(&self) -> LevelFilter {
        self.db().default
    }

    pub fn set_default_level(&self, level: LevelFilter) {
        let mut db = self.db();
        if db.default != level {
            db.default = level;
            info!("Set default log level to {level}");
            self.reload(&db);
        }
    }

    /// Set the level of every target carrying `tag`.
    ///
    /// # Errors
    ///
    /// Fails if no target carries `tag`.
    pub fn set_tag_level(&self, tag: &str, level: LevelFilter) -> Result<(), TraceCtlError> {
        let mut db = self.db();
        let changed = db.set_tag_level(tag, level)?;
        if changed > 0 {
            self.reload(&db);
            info!("Log level for tag '{tag}' set to {level} ({changed} targets)");
        }
        Ok(())
    }

    fn parse_config(input: &str) -> Result<Vec<(String, LevelFilter)>, TraceCtlError> {
        input
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| {
                let (tag, level) = item
                    .split_once('=')
                    .ok_or_else(|| TraceCtlError::Syntax(item.to_owned()))?;
                let level = LevelFilter::from_str(level.trim())
                    .map_err(|_| TraceCtlError::Level(level.trim().to_owned()))?;
                Ok((tag.trim().to_owned(), level))
            })
            .collect()
    }

    /// Apply a comma-separated list of `tag=level` items. `default=level` sets the level of
    /// targets that were not declared.
    ///
    /// The whole input is validated before anything is changed.
    ///
    /// # Errors
    ///
    /// Fails on bad syntax, unknown levels or unknown tags.
    pub fn setup_from_string(&self, input: &str) -> Result<(), TraceCtlError> {
        let config = Self::parse_config(input)?;
        let mut db = self.db();
        if let Some((tag, _)) = config
            .iter()
            .find(|(tag, _)| tag != "default" && !db.tags.contains_key(tag.as_str()))
        {
            return Err(TraceCtlError::UnknownTag(tag.clone()));
        }
        for (tag, level) in config {
            if tag == "default" {
                db.default = level;
            } else {
                db.set_tag_level(&tag, level)?;
            }
        }
        self.reload(&db);
        Ok(())
    }

    pub fn target(&self, target: &str) -> Option<TargetCfg> {
        self.db().targets.get(target).cloned()
    }

    pub fn targets_by_tag(&self, tag: &str) -> Vec<TargetCfg> {
        let db = self.db();
        db.tags
            .get(tag)
            .into_iter()
            .flatten()
            .filter_map(|t| db.targets.get(t).cloned())
            .collect()
    }

    /// The current configuration, in the syntax accepted by [`Self::setup_from_string`].
    pub fn as_config_string(&self) -> String {
        self.db().as_config_string()
    }
}
