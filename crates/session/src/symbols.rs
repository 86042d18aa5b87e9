// SDB - Session Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Symbol index and its background loader
//!
//! Enumerating every symbol of a large executable takes long enough to stall
//! the UI, so it runs on a small worker pool. The controller gets back a
//! [`PendingIndex`] that it polls once per tick without blocking.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use eyre::{Result, WrapErr};
use rayon::{ThreadPool, ThreadPoolBuilder};
use sdb_common::Loc;
use sdb_engine::{EngineError, EngineResult, RawSymbol, SymbolSource, TargetId};
use tokio::sync::oneshot::{self, error::TryRecvError};
use tracing::{debug, info, warn};

/// A navigable symbol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    /// Symbol name
    pub name: String,
    /// Start address
    pub address: u64,
    /// Line of the start address in its source file
    pub line: u32,
}

/// Symbols of a target grouped by source file.
///
/// Files are kept sorted by path; symbols within a file keep enumeration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolIndex {
    files: BTreeMap<PathBuf, Vec<Symbol>>,
}

impl SymbolIndex {
    /// Build an index from a raw module/symbol enumeration.
    ///
    /// Symbols starting at address zero are undefined or external references
    /// and are skipped, as are symbols without a source file.
    pub fn from_symbols(raw: impl IntoIterator<Item = RawSymbol>) -> Self {
        let mut files: BTreeMap<PathBuf, Vec<Symbol>> = BTreeMap::new();

        for sym in raw {
            if sym.address == 0 {
                continue;
            }

            let Some(loc) = sym.loc else {
                continue;
            };
            if loc.path.as_os_str().is_empty() {
                continue;
            }

            files.entry(loc.path).or_default().push(Symbol {
                name: sym.name,
                address: sym.address,
                line: loc.line,
            });
        }

        Self { files }
    }

    /// Number of source files with at least one symbol
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Total number of indexed symbols
    pub fn symbol_count(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }

    /// Whether the index has no files at all
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Every file with its symbols
    pub fn files(&self) -> impl Iterator<Item = (&Path, &[Symbol])> {
        self.files.iter().map(|(path, syms)| (path.as_path(), syms.as_slice()))
    }

    /// Symbols of one file
    pub fn symbols_in(&self, path: &Path) -> Option<&[Symbol]> {
        self.files.get(path).map(Vec::as_slice)
    }

    /// Files having at least one symbol whose name contains `needle`, with only
    /// the matching symbols. The match is case-sensitive; an empty needle keeps
    /// everything.
    pub fn filtered_files<'a>(&'a self, needle: &str) -> Vec<(&'a Path, Vec<&'a Symbol>)> {
        self.files
            .iter()
            .filter_map(|(path, syms)| {
                let matching: Vec<&Symbol> =
                    syms.iter().filter(|sym| sym.name.contains(needle)).collect();
                (!matching.is_empty()).then(|| (path.as_path(), matching))
            })
            .collect()
    }

    /// Every symbol whose name contains `needle`, in index order
    pub fn find_symbols<'a>(&'a self, needle: &str) -> Vec<(&'a Path, &'a Symbol)> {
        self.files()
            .flat_map(|(path, syms)| syms.iter().map(move |sym| (path, sym)))
            .filter(|(_, sym)| sym.name.contains(needle))
            .collect()
    }

    /// Files whose path contains `needle` (case-sensitive)
    pub fn files_matching_path(&self, needle: &str) -> Vec<&Path> {
        self.files
            .keys()
            .filter(|path| path.to_string_lossy().contains(needle))
            .map(PathBuf::as_path)
            .collect()
    }

    /// Location a symbol starts at
    pub fn symbol_loc(path: &Path, sym: &Symbol) -> Loc {
        Loc::new(path, sym.line)
    }

    /// Run a parsed search box command
    pub fn search<'a>(&'a self, command: SearchCommand<'_>) -> SearchHits<'a> {
        match command {
            SearchCommand::File(needle) => SearchHits::Files(self.files_matching_path(needle)),
            SearchCommand::Symbol(needle) => SearchHits::Symbols(self.find_symbols(needle)),
        }
    }
}

/// What the search box text asks for.
///
/// A leading `@` searches symbol names with the rest of the text; anything
/// else searches file paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchCommand<'a> {
    /// Files whose path contains the text
    File(&'a str),
    /// Symbols whose name contains the text
    Symbol(&'a str),
}

impl<'a> SearchCommand<'a> {
    /// Parse search box text
    pub fn parse(text: &'a str) -> Self {
        match text.strip_prefix('@') {
            Some(name) => Self::Symbol(name),
            None => Self::File(text),
        }
    }
}

/// Results of a [`SearchCommand`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchHits<'a> {
    /// Matching file paths
    Files(Vec<&'a Path>),
    /// Matching symbols with their files
    Symbols(Vec<(&'a Path, &'a Symbol)>),
}

impl SearchHits<'_> {
    /// Number of hits
    pub fn len(&self) -> usize {
        match self {
            Self::Files(files) => files.len(),
            Self::Symbols(symbols) => symbols.len(),
        }
    }

    /// Whether nothing matched
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
enum IndexState {
    Loading(oneshot::Receiver<EngineResult<SymbolIndex>>),
    Ready(Arc<SymbolIndex>),
    Failed(String),
}

/// An eventually-ready symbol index for one target.
///
/// Dropping it abandons the load: the worker finishes but its result is
/// discarded.
#[derive(Debug)]
pub struct PendingIndex {
    target: TargetId,
    state: IndexState,
}

impl PendingIndex {
    /// An index that failed before it could be submitted
    pub fn failed(target: TargetId, error: &EngineError) -> Self {
        Self { target, state: IndexState::Failed(error.to_string()) }
    }

    /// Target this index belongs to
    pub fn target(&self) -> TargetId {
        self.target
    }

    /// Check for a finished enumeration without blocking
    pub fn poll(&mut self) -> Option<&SymbolIndex> {
        if let IndexState::Loading(rx) = &mut self.state {
            match rx.try_recv() {
                Ok(Ok(index)) => {
                    info!(
                        target_id = %self.target,
                        files = index.file_count(),
                        symbols = index.symbol_count(),
                        "symbol index ready"
                    );
                    self.state = IndexState::Ready(Arc::new(index));
                }
                Ok(Err(e)) => {
                    warn!(target_id = %self.target, "symbol enumeration failed: {e}");
                    self.state = IndexState::Failed(e.to_string());
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Closed) => {
                    warn!(target_id = %self.target, "symbol worker went away without a result");
                    self.state = IndexState::Failed("symbol worker terminated".to_string());
                }
            }
        }

        self.ready()
    }

    /// The index, if it has been received by a previous poll
    pub fn ready(&self) -> Option<&SymbolIndex> {
        match &self.state {
            IndexState::Ready(index) => Some(index),
            _ => None,
        }
    }

    /// Whether the enumeration is still running
    pub fn is_loading(&self) -> bool {
        matches!(self.state, IndexState::Loading(_))
    }

    /// Failure message, if enumeration failed
    pub fn error(&self) -> Option<&str> {
        match &self.state {
            IndexState::Failed(msg) => Some(msg),
            _ => None,
        }
    }
}

/// Bounded worker pool running symbol enumeration jobs
pub struct SymbolLoader {
    pool: ThreadPool,
}

impl std::fmt::Debug for SymbolLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymbolLoader").field("workers", &self.pool.current_num_threads()).finish()
    }
}

impl SymbolLoader {
    /// Create a loader with `workers` threads
    pub fn new(workers: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("sdb-symbols-{i}"))
            .build()
            .wrap_err("Failed to create symbol worker pool")?;
        Ok(Self { pool })
    }

    /// Start enumerating the symbols of a target
    pub fn submit(&self, target: TargetId, source: Arc<dyn SymbolSource>) -> PendingIndex {
        let (tx, rx) = oneshot::channel();

        self.pool.spawn(move || {
            let result = source.enumerate_symbols().map(SymbolIndex::from_symbols);
            if tx.send(result).is_err() {
                debug!(target_id = %target, "symbol index abandoned by a newer load");
            }
        });

        PendingIndex { target, state: IndexState::Loading(rx) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn sym(address: u64, name: &str, path: Option<&str>, line: u32) -> RawSymbol {
        RawSymbol::new(address, name, path.map(|p| Loc::new(p, line)))
    }

    fn wait_ready(pending: &mut PendingIndex) -> SymbolIndex {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(index) = pending.poll() {
                return index.clone();
            }
            assert!(Instant::now() < deadline, "symbol index never became ready");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_zero_address_symbols_are_skipped() {
        let index = SymbolIndex::from_symbols(vec![
            sym(0, "printf", Some("/src/a.c"), 1),
            sym(0x1000, "main", Some("/src/a.c"), 3),
            sym(0, "malloc", Some("/src/b.c"), 1),
        ]);

        assert_eq!(index.file_count(), 1);
        let names: Vec<_> =
            index.symbols_in(Path::new("/src/a.c")).unwrap().iter().map(|s| &s.name).collect();
        assert_eq!(names, ["main"]);
    }

    #[test]
    fn test_only_zero_address_symbols_yield_empty_index() {
        let index = SymbolIndex::from_symbols(vec![
            sym(0, "a", Some("/src/a.c"), 1),
            sym(0, "b", Some("/src/b.c"), 2),
        ]);
        assert!(index.is_empty());
        assert_eq!(index.file_count(), 0);
    }

    #[test]
    fn test_symbols_without_source_are_dropped() {
        let index = SymbolIndex::from_symbols(vec![
            sym(0x10, "_start", None, 0),
            sym(0x20, "main", Some("/src/a.c"), 5),
        ]);
        assert_eq!(index.symbol_count(), 1);
    }

    #[test]
    fn test_grouping_preserves_per_file_order() {
        let index = SymbolIndex::from_symbols(vec![
            sym(0x30, "zeta", Some("/src/a.c"), 30),
            sym(0x10, "alpha", Some("/src/b.c"), 1),
            sym(0x20, "beta", Some("/src/a.c"), 20),
        ]);

        let a: Vec<_> =
            index.symbols_in(Path::new("/src/a.c")).unwrap().iter().map(|s| &s.name).collect();
        assert_eq!(a, ["zeta", "beta"]);
        assert_eq!(index.file_count(), 2);
    }

    #[test]
    fn test_filter_is_case_sensitive_substring() {
        let index = SymbolIndex::from_symbols(vec![
            sym(0x10, "parse_expr", Some("/src/parser.c"), 1),
            sym(0x20, "Parse_stmt", Some("/src/parser.c"), 9),
            sym(0x30, "main", Some("/src/main.c"), 1),
        ]);

        let files = index.filtered_files("parse");
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].0, Path::new("/src/parser.c"));
        assert_eq!(files[0].1.len(), 1);

        assert_eq!(index.filtered_files("").len(), 2);
        assert!(index.filtered_files("nothing").is_empty());
    }

    #[test]
    fn test_find_symbols_and_paths() {
        let index = SymbolIndex::from_symbols(vec![
            sym(0x10, "parse_expr", Some("/src/parser.c"), 12),
            sym(0x30, "main", Some("/src/main.c"), 1),
        ]);

        let found = index.find_symbols("expr");
        assert_eq!(found.len(), 1);
        assert_eq!(SymbolIndex::symbol_loc(found[0].0, found[0].1), Loc::new("/src/parser.c", 12));

        assert_eq!(index.files_matching_path("main"), [Path::new("/src/main.c")]);
    }

    #[test]
    fn test_search_command_prefix() {
        assert_eq!(SearchCommand::parse("@parse"), SearchCommand::Symbol("parse"));
        assert_eq!(SearchCommand::parse("src/main"), SearchCommand::File("src/main"));
        assert_eq!(SearchCommand::parse("a@b"), SearchCommand::File("a@b"));
        assert_eq!(SearchCommand::parse("@@x"), SearchCommand::Symbol("@x"));
        assert_eq!(SearchCommand::parse(""), SearchCommand::File(""));
        assert_eq!(SearchCommand::parse("@"), SearchCommand::Symbol(""));
    }

    #[test]
    fn test_search_dispatches_on_command() {
        let index = SymbolIndex::from_symbols(vec![
            sym(0x10, "parse_expr", Some("/src/parser.c"), 12),
            sym(0x20, "parse_stmt", Some("/src/parser.c"), 40),
            sym(0x30, "main", Some("/src/main.c"), 1),
        ]);

        let hits = index.search(SearchCommand::parse("@parse"));
        let SearchHits::Symbols(symbols) = &hits else {
            panic!("expected symbol hits, got {hits:?}");
        };
        let names: Vec<&str> = symbols.iter().map(|(_, sym)| sym.name.as_str()).collect();
        assert_eq!(names, ["parse_expr", "parse_stmt"]);

        // Path search, not symbol search
        assert_eq!(
            index.search(SearchCommand::parse("main")),
            SearchHits::Files(vec![Path::new("/src/main.c")])
        );
        assert!(index.search(SearchCommand::parse("parse_expr")).is_empty());

        // Empty text matches everything of its kind
        assert_eq!(index.search(SearchCommand::parse("")).len(), 2);
        assert_eq!(index.search(SearchCommand::parse("@")).len(), 3);
    }

    struct Fixed(Vec<RawSymbol>);

    impl SymbolSource for Fixed {
        fn enumerate_symbols(&self) -> EngineResult<Vec<RawSymbol>> {
            Ok(self.0.clone())
        }
    }

    struct Broken;

    impl SymbolSource for Broken {
        fn enumerate_symbols(&self) -> EngineResult<Vec<RawSymbol>> {
            Err(EngineError::Failed("no modules".to_string()))
        }
    }

    #[test]
    fn test_loader_delivers_index() {
        let loader = SymbolLoader::new(3).unwrap();
        let mut pending = loader
            .submit(TargetId(1), Arc::new(Fixed(vec![sym(0x10, "main", Some("/src/a.c"), 1)])));

        let index = wait_ready(&mut pending);
        assert_eq!(index.symbol_count(), 1);
        assert!(!pending.is_loading());
    }

    #[test]
    fn test_loader_reports_failure() {
        let loader = SymbolLoader::new(1).unwrap();
        let mut pending = loader.submit(TargetId(1), Arc::new(Broken));

        let deadline = Instant::now() + Duration::from_secs(5);
        while pending.is_loading() {
            pending.poll();
            assert!(Instant::now() < deadline);
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(pending.ready().is_none());
        assert!(pending.error().unwrap().contains("no modules"));
    }
}
