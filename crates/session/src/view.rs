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

//! Render-ready read model of a session

use std::path::Path;

use sdb_common::Loc;
use sdb_engine::{FrameId, VarId};

use crate::{
    state::Session,
    symbols::{SearchCommand, SearchHits, Symbol, SymbolIndex},
    variables::ValueState,
};

/// One line of the resident source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine<'a> {
    /// 1-based line number
    pub number: u32,
    /// Line text without the newline
    pub text: &'a str,
    /// A breakpoint is set on this line
    pub breakpoint: bool,
    /// The process is stopped on this line
    pub highlighted: bool,
}

/// One entry of the call stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRow<'a> {
    /// Frame handle
    pub id: FrameId,
    /// Function name, `"??"` when unknown
    pub function: &'a str,
    /// Current line of the frame
    pub loc: Option<&'a Loc>,
    /// The frame being inspected
    pub selected: bool,
}

/// One variable of the inspected frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarRow<'a> {
    /// Variable identity
    pub id: &'a VarId,
    /// Declared type, if known
    pub type_name: Option<&'a str>,
    /// Value display state
    pub value: ValueState<'a>,
}

/// Borrowed view over a [`Session`] for the front-end to draw from
#[derive(Debug, Clone, Copy)]
pub struct SessionView<'a> {
    session: &'a Session,
}

impl<'a> SessionView<'a> {
    /// View a session
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    /// The underlying session
    pub fn session(&self) -> &'a Session {
        self.session
    }

    /// The symbol index, once it is ready
    pub fn index(&self) -> Option<&'a SymbolIndex> {
        self.session.target.as_ref()?.index.ready()
    }

    /// Whether symbols are still being enumerated
    pub fn symbols_loading(&self) -> bool {
        self.session.target.as_ref().is_some_and(|target| target.index.is_loading())
    }

    /// Files with their symbols, filtered by the symbol search text.
    ///
    /// `None` while no index is available.
    pub fn files(&self) -> Option<Vec<(&'a Path, Vec<&'a Symbol>)>> {
        Some(self.index()?.filtered_files(&self.session.symbol_search))
    }

    /// Files or symbols matching search box text; `@name` searches symbols.
    ///
    /// `None` while no index is available.
    pub fn search(&self, query: &str) -> Option<SearchHits<'a>> {
        Some(self.index()?.search(SearchCommand::parse(query)))
    }

    /// Lines of the resident source file with their markers
    pub fn source_lines(&self) -> Vec<SourceLine<'a>> {
        let Some(file) = &self.session.source else {
            return Vec::new();
        };

        let breakpoints = self.session.breakpoints.lines_in(&file.path);
        let highlight = self
            .session
            .process
            .as_ref()
            .and_then(|process| process.highlight_loc.as_ref())
            .filter(|loc| loc.is_in(&file.path))
            .map(|loc| loc.line);

        file.text
            .lines()
            .zip(1u32..)
            .map(|(text, number)| SourceLine {
                number,
                text,
                breakpoint: breakpoints.contains(&number),
                highlighted: highlight == Some(number),
            })
            .collect()
    }

    /// Call stack of the current stop
    pub fn frames(&self) -> Vec<FrameRow<'a>> {
        let Some(process) = &self.session.process else {
            return Vec::new();
        };

        process
            .frames
            .iter()
            .enumerate()
            .map(|(i, frame)| FrameRow {
                id: frame.id,
                function: frame.function.as_deref().unwrap_or("??"),
                loc: frame.loc.as_ref(),
                selected: i == process.selected_frame,
            })
            .collect()
    }

    /// Variables of the inspected frame
    pub fn variables(&self) -> Vec<VarRow<'a>> {
        let Some(vars) = &self.session.vars else {
            return Vec::new();
        };

        vars.vars()
            .iter()
            .map(|desc| VarRow {
                id: &desc.id,
                type_name: desc.type_name.as_deref(),
                value: vars.value(&desc.id),
            })
            .collect()
    }

    /// Process output with control sequences stripped
    pub fn output_text(&self) -> String {
        self.session.output.text()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SourceFile;
    use std::path::PathBuf;

    #[test]
    fn test_blank_session_has_empty_view() {
        let session = Session::new();
        let view = SessionView::new(&session);
        assert!(view.files().is_none());
        assert!(view.search("@main").is_none());
        assert!(!view.symbols_loading());
        assert!(view.source_lines().is_empty());
        assert!(view.frames().is_empty());
        assert!(view.variables().is_empty());
        assert_eq!(view.output_text(), "");
    }

    #[test]
    fn test_source_lines_are_numbered_from_one() {
        let mut session = Session::new();
        session.source = Some(SourceFile {
            path: PathBuf::from("/src/a.c"),
            text: "first\nsecond\nthird".to_string(),
            scroll_to_line: None,
        });

        let lines = SessionView::new(&session).source_lines();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1].number, 2);
        assert_eq!(lines[1].text, "second");
        assert!(lines.iter().all(|line| !line.breakpoint && !line.highlighted));
    }

    #[test]
    fn test_output_text_is_stripped() {
        let session = Session::new();
        session.output.append(b"\x1B[32mok\x1B[0m\n");
        assert_eq!(SessionView::new(&session).output_text(), "ok\n");
    }
}
