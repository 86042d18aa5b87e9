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

//! Tick driver connecting a front-end to the reconciler
//!
//! The returned future is not `Send` when the engine is not; run it on a
//! current-thread runtime or a `LocalSet`.

use eyre::{Result, WrapErr};
use sdb_engine::DebugEngine;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::{
    config::Settings, intent::Intents, persist, reconcile::Reconciler, state::Session,
    view::SessionView,
};

/// Input and rendering side of the debugger
pub trait Frontend {
    /// Intents collected since the previous call
    fn poll_intents(&mut self) -> Intents;

    /// Draw the session after a tick
    fn render(&mut self, view: SessionView<'_>) -> Result<()>;
}

/// Run the session loop until the front-end asks to exit.
///
/// The session is restored from `settings.session_file` on a best-effort
/// basis and stored back after every tick. Returns the final session.
pub async fn run<E, F>(engine: E, frontend: &mut F, settings: &Settings) -> Result<Session>
where
    E: DebugEngine,
    F: Frontend + ?Sized,
{
    let mut reconciler = Reconciler::new(engine, settings)?;
    let mut session = Session::restore(persist::load_or_default(&settings.session_file));

    info!(
        session_file = %settings.session_file.display(),
        tick_ms = settings.tick_interval_ms,
        "Starting session loop"
    );

    let mut ticker = interval(settings.tick_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut ticks: u64 = 0;
    loop {
        ticker.tick().await;
        ticks += 1;

        let intents = frontend.poll_intents();
        let exit = intents.exit;
        session.intents.merge(intents);

        reconciler.tick(&mut session);
        frontend.render(SessionView::new(&session)).wrap_err("Front-end failed to render")?;

        persist::store(&settings.session_file, &session.to_saved())
            .wrap_err("Failed to store session")?;

        if exit {
            debug!(ticks, "exit requested");
            break;
        }
    }

    info!("Session loop finished");
    Ok(session)
}
