use std::sync::Arc;

use trellis_core::prelude::*;

trait Handler: Send + Sync {
    fn label(&self) -> String;
}

#[derive(Bean)]
#[bean(ordered, provides(dyn Handler))]
struct RankedHandler {
    order: i32,
}

impl OrderedBean for RankedHandler {
    fn bean_order(&self) -> i32 {
        self.order
    }
}

impl Handler for RankedHandler {
    fn label(&self) -> String {
        format!("order{}", self.order)
    }
}

#[derive(Bean, Default)]
#[bean(provides(dyn Handler))]
struct PlainHandler;

impl Handler for PlainHandler {
    fn label(&self) -> String {
        "unordered".to_string()
    }
}

#[derive(Bean, Default)]
struct Pipeline {
    #[inject]
    handlers: InjectList<dyn Handler>,
}

#[test]
fn test_list_respects_order() {
    let pipeline = Arc::new(Pipeline::default());
    let ctx = Context::new(beans![
        PlainHandler,
        RankedHandler { order: 2 },
        RankedHandler { order: 0 },
        RankedHandler { order: 1 },
        Scan::shared(pipeline.clone()),
    ])
    .unwrap();

    let labels: Vec<_> = pipeline.handlers.items().iter().map(|h| h.label()).collect();
    assert_eq!(labels, vec!["order0", "order1", "order2", "unordered"]);

    let handles = ctx.bean::<dyn Handler>(0);
    assert_eq!(handles.len(), 4);
    assert_eq!(handles[0].order(), Some(0));
    assert_eq!(handles[3].order(), None);
    ctx.close().unwrap();
}

#[derive(Bean, Default)]
struct EmptyPipeline {
    #[inject]
    handlers: InjectList<dyn Handler>,
}

#[test]
fn test_empty_list_is_an_error() {
    let err = Context::new(beans![EmptyPipeline::default()]).err().unwrap();
    assert!(matches!(err, Error::Missing { .. }), "{err}");
}

#[derive(Bean, Default)]
struct TolerantPipeline {
    #[inject(optional)]
    handlers: InjectList<dyn Handler>,
}

#[test]
fn test_optional_empty_list() {
    let pipeline = Arc::new(TolerantPipeline::default());
    let ctx = Context::new(beans![Scan::shared(pipeline.clone())]).unwrap();
    assert!(pipeline.handlers.is_empty());
    ctx.close().unwrap();
}

#[derive(Bean)]
#[bean(named, provides(dyn Handler))]
struct NamedHandler {
    name: &'static str,
}

impl NamedBean for NamedHandler {
    fn bean_name(&self) -> String {
        self.name.to_string()
    }
}

impl Handler for NamedHandler {
    fn label(&self) -> String {
        self.name.to_string()
    }
}

#[derive(Bean, Default)]
struct Router {
    #[inject]
    routes: InjectMap<dyn Handler>,
}

#[test]
fn test_map_keys_by_name() {
    let router = Arc::new(Router::default());
    let ctx = Context::new(beans![
        NamedHandler { name: "users" },
        NamedHandler { name: "orders" },
        Scan::shared(router.clone()),
    ])
    .unwrap();

    assert_eq!(router.routes.len(), 2);
    assert_eq!(router.routes.keys(), vec!["orders", "users"]);
    assert_eq!(router.routes.get("users").unwrap().label(), "users");
    assert_eq!(ctx.lookup("orders", 0).len(), 1);
    ctx.close().unwrap();
}

#[test]
fn test_map_duplicate_name() {
    let err = Context::new(beans![
        NamedHandler { name: "users" },
        NamedHandler { name: "users" },
        Router::default(),
    ])
    .err()
    .unwrap();
    match err {
        Error::DuplicateKey { key, field, .. } => {
            assert_eq!(key, "users");
            assert_eq!(field, "routes");
        }
        other => panic!("expected duplicate key error, got {other}"),
    }
}

#[test]
fn test_function_bean() {
    type Clock = dyn Fn() -> u64 + Send + Sync;

    #[derive(Bean, Default)]
    struct Stamp {
        #[inject]
        clock: Inject<Clock>,
    }

    let clock: Arc<Clock> = Arc::new(|| 42);
    let stamp = Arc::new(Stamp::default());
    let ctx = Context::new(beans![Scan::function(clock), Scan::shared(stamp.clone())]).unwrap();

    assert_eq!((*stamp.clock)(), 42);
    assert_eq!(ctx.bean::<Clock>(0).len(), 1);
    ctx.close().unwrap();
}
