use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use trellis_core::prelude::*;

#[derive(Bean, Default)]
struct Journal {
    entries: Mutex<Vec<&'static str>>,
}

impl Journal {
    fn record(&self, entry: &'static str) {
        self.entries.lock().push(entry);
    }

    fn entries(&self) -> Vec<&'static str> {
        self.entries.lock().clone()
    }
}

#[derive(Bean, Default)]
#[bean(initializing)]
struct Top {
    #[inject(lazy)]
    journal: Inject<Journal>,
    #[inject]
    middle: Inject<Middle>,
}

impl InitializingBean for Top {
    fn post_construct(&self) -> anyhow::Result<()> {
        self.journal.record("top");
        Ok(())
    }
}

#[derive(Bean, Default)]
#[bean(initializing)]
struct Middle {
    #[inject(lazy)]
    journal: Inject<Journal>,
    #[inject]
    bottom: Inject<Bottom>,
}

impl InitializingBean for Middle {
    fn post_construct(&self) -> anyhow::Result<()> {
        assert!(self.bottom.get().is_some());
        self.journal.record("middle");
        Ok(())
    }
}

#[derive(Bean, Default)]
#[bean(initializing)]
struct Bottom {
    #[inject(lazy)]
    journal: Inject<Journal>,
}

impl InitializingBean for Bottom {
    fn post_construct(&self) -> anyhow::Result<()> {
        self.journal.record("bottom");
        Ok(())
    }
}

#[test]
fn test_construction_follows_dependencies() {
    let journal = Arc::new(Journal::default());
    let ctx = Context::new(beans![
        Top::default(),
        Scan::shared(journal.clone()),
        Middle::default(),
        Bottom::default(),
    ])
    .unwrap();

    assert_eq!(journal.entries(), vec!["bottom", "middle", "top"]);
    let top = ctx.bean::<Top>(0);
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].lifecycle(), Lifecycle::Initialized);
    ctx.close().unwrap();
}

#[derive(Bean, Default)]
struct Alpha {
    #[inject]
    beta: Inject<Beta>,
}

#[derive(Bean, Default)]
struct Beta {
    #[inject]
    gamma: Inject<Gamma>,
}

#[derive(Bean, Default)]
struct Gamma {
    #[inject]
    alpha: Inject<Alpha>,
}

#[test]
fn test_hard_cycle_is_reported() {
    let err = Context::new(beans![Alpha::default(), Beta::default(), Gamma::default()])
        .err()
        .unwrap();
    match &err {
        Error::Cycle { path } => {
            for name in ["Alpha", "Beta", "Gamma"] {
                assert!(
                    path.iter().any(|p| p.ends_with(name)),
                    "{name} missing from {path:?}"
                );
            }
            assert_eq!(path.first(), path.last());
        }
        other => panic!("expected cycle error, got {other}"),
    }
    assert!(err.is_cycle());
    assert!(err.to_string().contains("->"));
}

#[derive(Bean, Default)]
struct RingA {
    #[inject]
    b: Inject<RingB>,
}

#[derive(Bean, Default)]
struct RingB {
    #[inject]
    c: Inject<RingC>,
}

#[derive(Bean, Default)]
struct RingC {
    #[inject(lazy)]
    a: Inject<RingA>,
}

#[test]
fn test_lazy_edge_breaks_cycle() {
    let ctx = Context::new(beans![RingA::default(), RingB::default(), RingC::default()]).unwrap();

    let c = ctx.bean::<RingC>(0)[0].object::<RingC>().unwrap();
    let a = ctx.bean::<RingA>(0)[0].object::<RingA>().unwrap();
    assert!(Arc::ptr_eq(c.a.get().unwrap(), &a));
    ctx.close().unwrap();
}

#[derive(Bean, Default)]
#[bean(disposable)]
struct Prepared {
    #[inject(lazy)]
    journal: Inject<Journal>,
}

impl DisposableBean for Prepared {
    fn destroy(&self) -> anyhow::Result<()> {
        self.journal.record("prepared destroyed");
        Ok(())
    }
}

#[derive(Bean, Default)]
#[bean(initializing)]
struct Failing {
    #[inject]
    prepared: Inject<Prepared>,
}

impl InitializingBean for Failing {
    fn post_construct(&self) -> anyhow::Result<()> {
        anyhow::bail!("database unreachable")
    }
}

#[test]
fn test_failed_post_construct_tears_down() {
    let journal = Arc::new(Journal::default());
    let err = Context::new(beans![
        Scan::shared(journal.clone()),
        Failing::default(),
        Prepared::default(),
    ])
    .err()
    .unwrap();

    match &err {
        Error::PostConstruct { chain, .. } => assert!(chain.ends_with("Failing")),
        other => panic!("expected post construct error, got {other}"),
    }
    assert!(err.to_string().contains("database unreachable"));
    assert_eq!(journal.entries(), vec!["prepared destroyed"]);
}

#[derive(Bean, Default)]
#[bean(initializing)]
struct Panicky;

impl InitializingBean for Panicky {
    fn post_construct(&self) -> anyhow::Result<()> {
        panic!("unexpected state")
    }
}

#[test]
fn test_panic_is_contained() {
    let err = Context::new(beans![Panicky]).err().unwrap();
    match err {
        Error::Panic { bean, message, .. } => {
            assert!(bean.ends_with("Panicky"));
            assert_eq!(message, "unexpected state");
        }
        other => panic!("expected panic error, got {other}"),
    }
}

#[derive(Bean, Default)]
struct NeedsMissing {
    #[inject]
    bottom: Inject<Bottom>,
}

#[test]
fn test_missing_dependency() {
    let err = Context::new(beans![NeedsMissing::default()]).err().unwrap();
    match err {
        Error::Missing { field, class, .. } => {
            assert_eq!(field, "bottom");
            assert!(class.ends_with("NeedsMissing"));
        }
        other => panic!("expected missing error, got {other}"),
    }
}

#[derive(Bean, Default)]
struct OptionalDependency {
    #[inject(optional)]
    bottom: Inject<Bottom>,
}

#[test]
fn test_optional_dependency_left_empty() {
    let bean = Arc::new(OptionalDependency::default());
    let ctx = Context::new(beans![Scan::shared(bean.clone())]).unwrap();
    assert!(!bean.bottom.is_injected());
    ctx.close().unwrap();
}

#[test]
fn test_nothing_entries_are_skipped() {
    let ctx = Context::new(vec![Scan::Nothing, Scan::List(vec![Scan::Nothing])]).unwrap();
    assert!(ctx.core().contains(&TypeKey::of::<Context>()));
    assert!(ctx.core().contains(&TypeKey::of::<Properties>()));
    assert_eq!(ctx.core().len(), 2);
    ctx.close().unwrap();
}

#[derive(Bean, Default)]
#[bean(disposable)]
struct SlowShutdown;

impl DisposableBean for SlowShutdown {
    fn destroy(&self) -> anyhow::Result<()> {
        std::thread::sleep(Duration::from_secs(3));
        Ok(())
    }
}

#[derive(Bean, Default)]
#[bean(initializing)]
struct BrokenStartup {
    #[inject]
    slow: Inject<SlowShutdown>,
}

impl InitializingBean for BrokenStartup {
    fn post_construct(&self) -> anyhow::Result<()> {
        anyhow::bail!("port already bound")
    }
}

#[test]
fn test_failed_build_waits_at_most_close_timeout() {
    let started = Instant::now();
    let err = Context::builder()
        .close_timeout(Duration::from_millis(100))
        .scan(BrokenStartup::default())
        .scan(SlowShutdown::default())
        .build()
        .err()
        .unwrap();
    let elapsed = started.elapsed();

    assert!(matches!(err, Error::PostConstruct { .. }), "{err}");
    assert!(elapsed >= Duration::from_millis(100), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(2), "{elapsed:?}");
}

#[derive(Bean, Default)]
struct Recursive {
    #[inject]
    me: Inject<Recursive>,
}

#[test]
fn test_hard_self_reference_assembles() {
    let ctx = Context::new(beans![Recursive::default()]).unwrap();
    let bean = ctx.bean::<Recursive>(0)[0].object::<Recursive>().unwrap();
    assert!(Arc::ptr_eq(bean.me.get().unwrap(), &bean));
    ctx.close().unwrap();
}
