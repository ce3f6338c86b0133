//! Events of datacenter simulations.

use serde::Serialize;

use crate::job::{Job, JobId};

/// All events processed by the [`DataCenter`](crate::DataCenter) component.
///
/// Servers, sockets and cores are addressed by their indices.
#[derive(Clone, Serialize)]
pub enum DcEvent {
    JobArrival { server: usize, job: Job },
    JobFinish { server: usize, job_id: JobId },
    CoreEnteredPark { server: usize, socket: usize, core: usize },
    CoreExitedPark { server: usize, socket: usize, core: usize },
    SocketEnteredPark { server: usize, socket: usize },
    SocketExitedPark { server: usize, socket: usize },
    NapTransitionedToActive { server: usize },
    NapTransitionedToNap { server: usize },
    JobTimeout { server: usize, job_id: JobId },
    StartBatch { server: usize },
    RecalculateCaps,
}

impl DcEvent {
    /// Returns the server affected by the event, `None` for datacenter-wide events.
    pub fn server(&self) -> Option<usize> {
        match self {
            DcEvent::JobArrival { server, .. }
            | DcEvent::JobFinish { server, .. }
            | DcEvent::CoreEnteredPark { server, .. }
            | DcEvent::CoreExitedPark { server, .. }
            | DcEvent::SocketEnteredPark { server, .. }
            | DcEvent::SocketExitedPark { server, .. }
            | DcEvent::NapTransitionedToActive { server }
            | DcEvent::NapTransitionedToNap { server }
            | DcEvent::JobTimeout { server, .. }
            | DcEvent::StartBatch { server } => Some(*server),
            DcEvent::RecalculateCaps => None,
        }
    }
}
