// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, anyhow, bail};
use quoter_app::{CalculationId, TableModel, TotalsResponse};
use quoter_db::Store;
use quoter_sync::{SyncRequest, TotalsSync};
use quoter_tui::InternalEvent;
use std::sync::mpsc::Sender;
use tracing::{debug, info};

/// Connects the terminal UI to the SQLite store and the totals server.
pub struct DbRuntime<'a> {
    store: &'a Store,
    calculation_id: CalculationId,
    sync: Option<TotalsSync>,
}

impl<'a> DbRuntime<'a> {
    pub fn new(store: &'a Store, calculation_id: CalculationId, sync: Option<TotalsSync>) -> Self {
        Self {
            store,
            calculation_id,
            sync,
        }
    }
}

impl quoter_tui::AppRuntime for DbRuntime<'_> {
    fn save_table(&mut self, table: &TableModel) -> Result<()> {
        self.store.save_table(self.calculation_id, table)?;
        info!(
            calculation_id = self.calculation_id.get(),
            items = table.item_count(),
            "calculation saved"
        );
        Ok(())
    }

    fn sync_enabled(&self) -> bool {
        self.sync.is_some()
    }

    fn run_totals_sync(
        &mut self,
        form: &[(String, String)],
        adjust: bool,
    ) -> Result<TotalsResponse> {
        let Some(sync) = &self.sync else {
            bail!("totals sync is off -- enable [sync] in the config and retry");
        };
        sync.client().post_update(form, adjust)
    }

    fn spawn_totals_sync(
        &mut self,
        request_id: u64,
        form: Vec<(String, String)>,
        adjust: bool,
        tx: Sender<InternalEvent>,
    ) -> Result<()> {
        let Some(sync) = self.sync.as_mut() else {
            bail!("totals sync is off -- enable [sync] in the config and retry");
        };
        debug!(request_id, fields = form.len(), adjust, "queue totals sync");
        sync.spawn(
            SyncRequest {
                request_id,
                form,
                adjust,
            },
            move |request_id, outcome| {
                // Receiver is gone once the UI has exited.
                let _ = tx.send(InternalEvent::TotalsSync {
                    request_id,
                    outcome,
                });
            },
        )
    }

    fn cancel_totals_sync(&mut self, request_id: u64) -> Result<()> {
        let sync = self
            .sync
            .as_mut()
            .ok_or_else(|| anyhow!("totals sync is off"))?;
        if sync.abort(request_id) {
            debug!(request_id, "aborted totals sync");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::DbRuntime;
    use anyhow::{Result, anyhow};
    use quoter_app::SyncOutcome;
    use quoter_db::Store;
    use quoter_sync::{Client, TotalsSync};
    use quoter_testkit::sample_table;
    use quoter_tui::{AppRuntime, InternalEvent};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;
    use tiny_http::{Header, Response, Server};

    #[test]
    fn save_table_writes_through_to_store() -> Result<()> {
        let store = Store::open_memory()?;
        store.bootstrap()?;
        let calculation_id = store.seed_demo_data()?;
        let table = sample_table(&store.list_categories()?)?;

        let mut runtime = DbRuntime::new(&store, calculation_id, None);
        runtime.save_table(&table)?;
        assert_eq!(store.load_table(calculation_id)?.item_count(), 4);
        assert!(!runtime.sync_enabled());
        Ok(())
    }

    #[test]
    fn spawn_without_sync_is_an_actionable_error() -> Result<()> {
        let store = Store::open_memory()?;
        store.bootstrap()?;
        let calculation_id = store.seed_demo_data()?;
        let mut runtime = DbRuntime::new(&store, calculation_id, None);
        let (tx, _rx) = mpsc::channel();

        let error = runtime
            .spawn_totals_sync(1, Vec::new(), false, tx)
            .expect_err("sync is disabled");
        assert!(error.to_string().contains("enable [sync]"));
        Ok(())
    }

    #[test]
    fn spawned_sync_reports_back_over_channel() -> Result<()> {
        let server =
            Server::http("127.0.0.1:0").map_err(|error| anyhow!("start mock server: {error}"))?;
        let url = format!("http://{}/update", server.server_addr());
        let handle = thread::spawn(move || {
            if let Ok(request) = server.recv() {
                let header = Header::from_bytes("Content-Type", "application/json")
                    .expect("static header");
                let response = Response::from_string(
                    r#"{"result":true,"body":"<p>Total 1,000.00</p>","overall_margin":1.1}"#,
                )
                .with_header(header);
                let _ = request.respond(response);
            }
        });

        let store = Store::open_memory()?;
        store.bootstrap()?;
        let calculation_id = store.seed_demo_data()?;
        let client = Client::new(&url, Duration::from_secs(5))?;
        let mut runtime = DbRuntime::new(
            &store,
            calculation_id,
            Some(TotalsSync::new(client, Duration::ZERO)),
        );
        let table = store.load_table(calculation_id)?;
        let (tx, rx) = mpsc::channel();
        runtime.spawn_totals_sync(7, table.serialize_form(), false, tx)?;

        match rx.recv_timeout(Duration::from_secs(10))? {
            InternalEvent::TotalsSync {
                request_id,
                outcome: SyncOutcome::Completed(response),
            } => {
                assert_eq!(request_id, 7);
                assert!(response.result);
                assert_eq!(response.overall_margin, Some(1.1));
            }
            other => panic!("unexpected event {other:?}"),
        }
        handle.join().expect("server thread");
        Ok(())
    }
}
