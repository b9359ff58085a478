//! # Readiness Union
//!
//! Aggregates N named sources into one. The union is ready exactly when
//! every source is ready; its ready args map source name to that source's
//! latest args.
//!
//! Union subscribers must not emit on the union's own sources from inside
//! a callback.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use super::tracker::{Callbacks, ReadinessGate, Reliable, ReliableSubscription};
use crate::errors::{HorizonError, HorizonResult};

/// Ready args of a union: source name → args
pub type UnionArgs<T> = BTreeMap<String, T>;

struct UnionState<T> {
    /// Sources currently not ready
    not_ready: usize,
    /// Latest args per source; `None` while that source is unready
    sources: BTreeMap<String, Option<T>>,
    ready: bool,
}

impl<T: Clone> UnionState<T> {
    fn source_ready(&mut self, name: &str, args: &T) -> Option<UnionArgs<T>> {
        let slot = self.sources.get_mut(name)?;
        if slot.is_none() {
            self.not_ready = self.not_ready.saturating_sub(1);
        }
        *slot = Some(args.clone());

        if self.not_ready == 0 && !self.ready {
            self.ready = true;
            Some(
                self.sources
                    .iter()
                    .filter_map(|(k, v)| v.clone().map(|v| (k.clone(), v)))
                    .collect(),
            )
        } else {
            None
        }
    }

    fn source_unready(&mut self, name: &str) -> bool {
        let Some(slot) = self.sources.get_mut(name) else {
            return false;
        };
        if slot.take().is_some() {
            self.not_ready += 1;
        }

        if self.not_ready > 0 && self.ready {
            self.ready = false;
            true
        } else {
            false
        }
    }
}

/// Readiness of several sources combined
pub struct ReliableUnion<T> {
    inner: Arc<Reliable<UnionArgs<T>>>,
    children: Mutex<Vec<ReliableSubscription>>,
}

impl<T> ReliableUnion<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Subscribe to every source. Source names must be unique.
    pub fn new(
        name: impl Into<String>,
        sources: Vec<(String, Arc<Reliable<T>>)>,
    ) -> HorizonResult<Arc<Self>> {
        let mut names = BTreeMap::new();
        for (source_name, _) in &sources {
            if names.insert(source_name.clone(), None).is_some() {
                return Err(HorizonError::configuration(format!(
                    "Duplicate readiness source: {}",
                    source_name
                )));
            }
        }

        let state = Arc::new(Mutex::new(UnionState {
            not_ready: names.len(),
            sources: names,
            ready: false,
        }));
        let union = Arc::new(Self {
            inner: Reliable::new(name),
            children: Mutex::new(Vec::with_capacity(sources.len())),
        });

        for (source_name, source) in sources {
            let callbacks = Self::child_callbacks(&union.inner, &state, source_name);
            match source.subscribe(callbacks) {
                Ok(sub) => {
                    if let Ok(mut children) = union.children.lock() {
                        children.push(sub);
                    }
                }
                Err(e) => {
                    union.close("source subscription failed");
                    return Err(e);
                }
            }
        }

        Ok(union)
    }

    fn child_callbacks(
        inner: &Arc<Reliable<UnionArgs<T>>>,
        state: &Arc<Mutex<UnionState<T>>>,
        source_name: String,
    ) -> Callbacks<T> {
        let (ready_inner, ready_state, ready_name) =
            (Arc::clone(inner), Arc::clone(state), source_name.clone());
        let (unready_inner, unready_state, unready_name) =
            (Arc::clone(inner), Arc::clone(state), source_name);

        // The state guard is held while publishing, so racing sources
        // publish in the order the state machine decided.
        Callbacks::new()
            .on_ready(move |args: &T| {
                let mut state = ready_state
                    .lock()
                    .map_err(|_| HorizonError::internal("Union lock poisoned"))?;
                match state.source_ready(&ready_name, args) {
                    Some(all) => ready_inner.emit_ready(all),
                    None => Ok(()),
                }
            })
            .on_unready(move |reason| {
                let mut state = unready_state
                    .lock()
                    .map_err(|_| HorizonError::internal("Union lock poisoned"))?;
                if state.source_unready(&unready_name) {
                    unready_inner.emit_unready(reason.cloned())
                } else {
                    Ok(())
                }
            })
    }

    /// Subscribe to the union's own transitions
    pub fn subscribe(
        &self,
        callbacks: Callbacks<UnionArgs<T>>,
    ) -> HorizonResult<ReliableSubscription> {
        self.inner.subscribe(callbacks)
    }

    /// Latest args of every source, if the union is ready
    pub fn ready_args(&self) -> Option<UnionArgs<T>> {
        self.inner.ready_args()
    }

    /// Close every source subscription, then the union itself
    pub fn close(&self, reason: &str) {
        if let Ok(mut children) = self.children.lock() {
            for sub in children.drain(..) {
                sub.close();
            }
        }
        self.inner.close(reason);
    }

    /// Whether the union has been closed
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

impl<T> ReadinessGate for ReliableUnion<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn is_ready(&self) -> bool {
        self.inner.is_ready()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sources(n: usize) -> Vec<(String, Arc<Reliable<u32>>)> {
        (0..n)
            .map(|i| (format!("s{}", i), Reliable::new(format!("s{}", i))))
            .collect()
    }

    #[test]
    fn test_ready_when_all_sources_ready() {
        let srcs = sources(2);
        let union = ReliableUnion::new("union", srcs.clone()).unwrap();

        srcs[0].1.emit_ready(1).unwrap();
        assert!(!union.is_ready());
        srcs[1].1.emit_ready(2).unwrap();
        assert!(union.is_ready());

        let args = union.ready_args().unwrap();
        assert_eq!(args.get("s0"), Some(&1));
        assert_eq!(args.get("s1"), Some(&2));
    }

    #[test]
    fn test_already_ready_sources_count() {
        let srcs = vec![
            ("a".to_string(), Reliable::ready_with("a", 1u32)),
            ("b".to_string(), Reliable::ready_with("b", 2u32)),
        ];
        let union = ReliableUnion::new("union", srcs).unwrap();
        assert!(union.is_ready());
    }

    #[test]
    fn test_repeated_ready_does_not_double_count() {
        let srcs = sources(2);
        let union = ReliableUnion::new("union", srcs.clone()).unwrap();

        srcs[0].1.emit_ready(1).unwrap();
        srcs[0].1.emit_ready(1).unwrap();
        assert!(!union.is_ready());
    }

    #[test]
    fn test_duplicate_source_names_rejected() {
        let a = Reliable::<u32>::new("a");
        let result = ReliableUnion::new(
            "union",
            vec![("a".to_string(), Arc::clone(&a)), ("a".to_string(), a)],
        );
        assert!(matches!(result, Err(HorizonError::Configuration(_))));
    }

    #[test]
    fn test_close_releases_child_subscriptions() {
        let srcs = sources(3);
        let union = ReliableUnion::new("union", srcs.clone()).unwrap();
        assert!(srcs.iter().all(|(_, s)| s.subscriber_count() == 1));

        let unready = Arc::new(AtomicUsize::new(0));
        let unready_cb = Arc::clone(&unready);
        for (_, s) in &srcs {
            s.emit_ready(0).unwrap();
        }
        union
            .subscribe(Callbacks::new().on_unready(move |_| {
                unready_cb.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
            .unwrap();

        union.close("shutdown");

        assert!(srcs.iter().all(|(_, s)| s.subscriber_count() == 0));
        assert!(union.is_closed());
        assert_eq!(unready.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_racing_sources_publish_in_order() {
        let srcs = sources(2);
        for (_, s) in &srcs {
            s.emit_ready(0).unwrap();
        }
        let union = ReliableUnion::new("union", srcs.clone()).unwrap();

        let published: Arc<Mutex<Vec<bool>>> = Arc::new(Mutex::new(Vec::new()));
        let (on_ready, on_unready) = (Arc::clone(&published), Arc::clone(&published));
        union
            .subscribe(
                Callbacks::new()
                    .on_ready(move |_| {
                        on_ready.lock().unwrap().push(true);
                        Ok(())
                    })
                    .on_unready(move |_| {
                        on_unready.lock().unwrap().push(false);
                        Ok(())
                    }),
            )
            .unwrap();

        let workers: Vec<_> = srcs
            .iter()
            .map(|(_, source)| {
                let source = Arc::clone(source);
                std::thread::spawn(move || {
                    for i in 0..500u32 {
                        source.emit_unready(None).unwrap();
                        source.emit_ready(i).unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let published = published.lock().unwrap();
        assert_eq!(published.first(), Some(&true));
        for pair in published.windows(2) {
            assert_ne!(pair[0], pair[1], "transition published twice in a row");
        }
        assert_eq!(published.last(), Some(&true));
        assert!(union.is_ready());
    }

    #[test]
    fn test_closed_source_fails_union() {
        let a = Reliable::<u32>::new("a");
        a.close("gone");
        let result = ReliableUnion::new("union", vec![("a".to_string(), a)]);
        assert!(matches!(result, Err(HorizonError::Closed(_))));
    }
}
