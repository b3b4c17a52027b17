use std::{future::Future, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Temporizador de inactividad de una guild.
///
/// Como mucho hay uno armado: armar de nuevo cancela el anterior. El
/// callback recibe el id del armado para que pueda comprobar que sigue
/// siendo el vigente antes de actuar.
#[derive(Debug, Default)]
pub struct InactivityTimer {
    armed: Option<Armed>,
    next_id: u64,
}

#[derive(Debug)]
struct Armed {
    id: u64,
    token: CancellationToken,
}

impl InactivityTimer {
    pub fn arm<F, Fut>(&mut self, after: Duration, on_fire: F) -> u64
    where
        F: FnOnce(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();

        self.next_id += 1;
        let id = self.next_id;
        let token = CancellationToken::new();
        let cancelled = token.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {
                    debug!("⏱️ Temporizador {} cancelado", id);
                }
                _ = tokio::time::sleep(after) => on_fire(id).await,
            }
        });

        self.armed = Some(Armed { id, token });
        id
    }

    /// Devuelve `true` si había un temporizador armado
    pub fn cancel(&mut self) -> bool {
        match self.armed.take() {
            Some(armed) => {
                armed.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Consume el armado `id` si sigue siendo el vigente
    pub fn take_fired(&mut self, id: u64) -> bool {
        if self.armed.as_ref().map(|a| a.id) == Some(id) {
            self.armed = None;
            true
        } else {
            false
        }
    }
}

impl Drop for InactivityTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
