//! Per-connection session: one `FormState` plus the message router.
//!
//! Sessions never share selection state. The catalog, export options and
//! mail transport are shared read-only through `SessionContext`.

use std::sync::Arc;

use wrfsel_core::{
    AggregationKind, Catalog, FormError, FormEvent, FormState, ScenarioId, SelectionStore,
};
use wrfsel_notify::{export_and_notify, ExportError, ExportOptions, MailTransport};
use wrfsel_protocol::*;

/// Process-wide, immutable inputs every session is built from.
#[derive(Clone)]
pub struct SessionContext {
    pub catalog: Arc<Catalog>,
    /// Scenario selector options, in display order.
    pub scenarios: Vec<ScenarioId>,
    pub default_scenario: ScenarioId,
    pub export: ExportOptions,
    pub transport: Arc<dyn MailTransport>,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("catalog", &self.catalog.len())
            .field("scenarios", &self.scenarios)
            .field("default_scenario", &self.default_scenario)
            .field("export", &self.export)
            .field("transport", &"...")
            .finish()
    }
}

pub struct Session {
    id: String,
    form: FormState,
    context: Arc<SessionContext>,
}

impl Session {
    pub fn new(context: Arc<SessionContext>) -> Self {
        let store = SelectionStore::new(&context.catalog, context.scenarios.iter().cloned());
        let form = FormState::new(store, context.default_scenario.clone());
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            form,
            context,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn form(&self) -> &FormState {
        &self.form
    }

    /// Response to an accepted hello.
    pub fn welcome(&self, request_id: String, protocol_version: u32) -> ServerMessage {
        ServerMessage::Welcome(WelcomeMessage {
            id: request_id,
            session_id: self.id.clone(),
            protocol_version: protocol_version.min(PROTOCOL_VERSION),
            catalog: self.context.catalog.variables().to_vec(),
            scenarios: self.form.store().scenarios().cloned().collect(),
            aggregations: AggregationKind::ALL.to_vec(),
            view: self.form.view(),
        })
    }

    /// Handle one message after the handshake.
    pub fn handle(&mut self, msg: ClientMessage) -> ServerMessage {
        match msg {
            ClientMessage::Hello(h) => {
                ServerMessage::Error(ProtocolError::AlreadyAuthenticated.to_error_message(Some(h.id)))
            }
            ClientMessage::SelectRows(m) => self.apply(
                m.id,
                FormEvent::SelectRows {
                    scenario: m.scenario,
                    aggregation: m.aggregation,
                    indices: m.indices,
                },
            ),
            ClientMessage::SetScenario(m) => self.apply(m.id, FormEvent::ScenarioChanged(m.scenario)),
            ClientMessage::SetAggregation(m) => self.apply(m.id, FormEvent::AggregationChanged(m.aggregation)),
            ClientMessage::SetEmail(m) => self.apply(m.id, FormEvent::EmailChanged(m.email)),
            ClientMessage::Submit(m) => self.submit(m),
            ClientMessage::Inspect(m) => ServerMessage::View(ViewMessage {
                id: m.id,
                view: self.form.view(),
            }),
            ClientMessage::Ping(p) => ServerMessage::Pong(PongMessage { id: p.id }),
        }
    }

    fn apply(&mut self, id: String, event: FormEvent) -> ServerMessage {
        match self.form.handle(event) {
            Ok(patch) => ServerMessage::ViewPatch(ViewPatchMessage { id, patch }),
            Err(FormError::UnknownScenario(name)) => {
                log::debug!("Session {}: unknown scenario '{}'", self.id, name);
                ServerMessage::Error(
                    ProtocolError::UnknownScenario.with_message(Some(id), format!("Unknown scenario: {}", name)),
                )
            }
        }
    }

    fn submit(&mut self, m: SubmitMessage) -> ServerMessage {
        if let Some(email) = m.email {
            if let Err(e) = self.form.handle(FormEvent::EmailChanged(email)) {
                log::debug!("Session {}: {}", self.id, e);
            }
        }

        let result = export_and_notify(
            self.form.store(),
            self.form.email(),
            &self.context.export,
            self.context.transport.as_ref(),
        );

        match result {
            Ok(receipt) => ServerMessage::ExportResult(ExportResultMessage {
                id: m.id,
                recipients: receipt.recipients,
                files: receipt.files,
                scenarios: receipt.scenarios,
                attempts: receipt.attempts,
            }),
            Err(e) => {
                log::warn!("Session {}: export failed: {}", self.id, e);
                ServerMessage::Error(export_error(Some(m.id), &e))
            }
        }
    }
}

/// Map an export failure onto the wire error with the matching code.
fn export_error(id: Option<String>, err: &ExportError) -> ErrorMessage {
    ErrorMessage {
        id,
        code: err.code().to_string(),
        message: err.to_string(),
    }
}
