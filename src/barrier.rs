use tokio::sync::watch;
use tracing::warn;

/// Reusable counting barrier.
///
/// `add` raises the pending count, `done` lowers it by one and `wait`
/// resolves once the count reaches zero. The same barrier is reused for the
/// worker-completion phase and the settlement phase of a run; callers must
/// not start waiting on a phase while adds from an earlier phase are still
/// unmatched.
#[derive(Debug)]
pub struct Barrier {
    pending: watch::Sender<u64>,
}

impl Default for Barrier {
    fn default() -> Self {
        Self::new()
    }
}

impl Barrier {
    pub fn new() -> Self {
        let (pending, _) = watch::channel(0);
        Self { pending }
    }

    pub fn add(&self, n: u64) {
        if n == 0 {
            return;
        }
        self.pending.send_modify(|pending| *pending += n);
    }

    pub fn done(&self) {
        let mut underflow = false;
        self.pending.send_if_modified(|pending| {
            if *pending == 0 {
                underflow = true;
                return false;
            }
            *pending -= 1;
            true
        });
        if underflow {
            warn!("barrier signaled with nothing pending; ignoring");
        }
    }

    pub fn pending(&self) -> u64 {
        *self.pending.borrow()
    }

    pub async fn wait(&self) {
        let mut rx = self.pending.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|pending| *pending == 0).await;
    }
}
