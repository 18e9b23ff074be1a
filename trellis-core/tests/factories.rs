use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use trellis_core::prelude::*;

#[derive(Bean)]
#[bean(named)]
struct Connection {
    id: usize,
}

impl NamedBean for Connection {
    fn bean_name(&self) -> String {
        format!("connection-{}", self.id)
    }
}

#[derive(Bean, Default)]
struct Settings {
    pool: usize,
}

#[derive(Bean)]
#[bean(factory)]
struct ConnectionFactory {
    singleton: bool,
    calls: AtomicUsize,
    #[inject]
    settings: Inject<Settings>,
}

impl ConnectionFactory {
    fn new(singleton: bool) -> Self {
        Self {
            singleton,
            calls: AtomicUsize::new(0),
            settings: Inject::new(),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FactoryBean for ConnectionFactory {
    fn object(&self) -> anyhow::Result<Product> {
        assert_eq!(self.settings.pool, 4);
        let id = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Product::bean(Connection { id })?)
    }

    fn object_type(&self) -> TypeKey {
        TypeKey::of::<Connection>()
    }

    fn singleton(&self) -> bool {
        self.singleton
    }
}

#[derive(Bean, Default)]
struct UserRepo {
    #[inject]
    connection: Inject<Connection>,
}

#[derive(Bean, Default)]
struct OrderRepo {
    #[inject]
    connection: Inject<Connection>,
}

#[derive(Bean, Default)]
struct AuditRepo {
    #[inject]
    connections: InjectList<Connection>,
}

#[test]
fn test_singleton_factory_produces_once() {
    let factory = Arc::new(ConnectionFactory::new(true));
    let users = Arc::new(UserRepo::default());
    let orders = Arc::new(OrderRepo::default());
    let audit = Arc::new(AuditRepo::default());
    let ctx = Context::new(beans![
        Scan::shared(users.clone()),
        Scan::shared(orders.clone()),
        Scan::shared(audit.clone()),
        Scan::shared(factory.clone()),
        Settings { pool: 4 },
    ])
    .unwrap();

    assert_eq!(factory.calls(), 1);
    assert!(Arc::ptr_eq(
        users.connection.get().unwrap(),
        orders.connection.get().unwrap()
    ));
    assert_eq!(audit.connections.len(), 1);

    let handles = ctx.bean::<Connection>(0);
    assert_eq!(handles.len(), 1);
    assert!(handles[0].is_factory_product());
    assert_eq!(handles[0].name(), "connection-1");
    assert_eq!(ctx.lookup("connection-1", 0).len(), 1);
    ctx.close().unwrap();
}

#[test]
fn test_prototype_factory_produces_per_reference() {
    let factory = Arc::new(ConnectionFactory::new(false));
    let users = Arc::new(UserRepo::default());
    let orders = Arc::new(OrderRepo::default());
    let ctx = Context::new(beans![
        Scan::shared(factory.clone()),
        Settings { pool: 4 },
        Scan::shared(users.clone()),
        Scan::shared(orders.clone()),
    ])
    .unwrap();

    assert_eq!(factory.calls(), 2);
    assert_ne!(users.connection.id, orders.connection.id);

    let mut names: Vec<_> = ctx.bean::<Connection>(0).iter().map(|h| h.name()).collect();
    names.sort();
    assert_eq!(names, vec!["connection-1", "connection-2"]);
    ctx.close().unwrap();
}

#[test]
fn test_unreferenced_factory_still_produces() {
    let factory = Arc::new(ConnectionFactory::new(false));
    let ctx = Context::new(beans![Scan::shared(factory.clone()), Settings { pool: 4 }]).unwrap();

    assert_eq!(factory.calls(), 1);
    let handles = ctx.bean::<Connection>(0);
    assert_eq!(handles.len(), 1);
    assert_eq!(handles[0].lifecycle(), Lifecycle::Initialized);
    ctx.close().unwrap();
}

#[test]
fn test_repeated_producer() {
    let err = Context::new(beans![
        ConnectionFactory::new(true),
        Connection { id: 9 },
        Settings { pool: 4 },
    ])
    .err()
    .unwrap();
    assert!(matches!(err, Error::RepeatedProducer { .. }), "{err}");
    assert!(err.to_string().contains("repeated"));
}

#[derive(Bean, Default)]
#[bean(factory)]
struct WrongFactory;

impl FactoryBean for WrongFactory {
    fn object(&self) -> anyhow::Result<Product> {
        Ok(Product::shared(Arc::new("not a connection".to_string())))
    }

    fn object_type(&self) -> TypeKey {
        TypeKey::of::<Connection>()
    }
}

#[test]
fn test_product_must_match_output_type() {
    let err = Context::new(beans![WrongFactory, UserRepo::default()]).err().unwrap();
    match &err {
        Error::Factory { source, .. } => assert!(source.to_string().contains("can not be used as")),
        other => panic!("expected factory error, got {other}"),
    }
}

#[derive(Bean, Default)]
#[bean(factory)]
struct BrokenFactory;

impl FactoryBean for BrokenFactory {
    fn object(&self) -> anyhow::Result<Product> {
        anyhow::bail!("pool exhausted")
    }

    fn object_type(&self) -> TypeKey {
        TypeKey::of::<Connection>()
    }
}

#[test]
fn test_factory_error_aborts_context() {
    let err = Context::new(beans![BrokenFactory, UserRepo::default()]).err().unwrap();
    match &err {
        Error::Factory { factory, target, .. } => {
            assert!(factory.ends_with("BrokenFactory"));
            assert!(target.ends_with("Connection"));
        }
        other => panic!("expected factory error, got {other}"),
    }
    assert!(err.to_string().contains("pool exhausted"));
}

trait Greeting: Send + Sync {
    fn text(&self) -> String;
}

struct Hello;

impl Greeting for Hello {
    fn text(&self) -> String {
        "hello".to_string()
    }
}

#[derive(Bean, Default)]
#[bean(factory)]
struct GreetingFactory;

impl FactoryBean for GreetingFactory {
    fn object(&self) -> anyhow::Result<Product> {
        let greeting: Arc<dyn Greeting> = Arc::new(Hello);
        Ok(Product::shared(greeting).named("greeting"))
    }

    fn object_type(&self) -> TypeKey {
        TypeKey::of::<dyn Greeting>()
    }
}

#[derive(Bean, Default)]
struct Greeter {
    #[inject]
    greeting: Inject<dyn Greeting>,
}

#[test]
fn test_factory_for_trait_object() {
    let greeter = Arc::new(Greeter::default());
    let ctx = Context::new(beans![Scan::shared(greeter.clone()), GreetingFactory]).unwrap();

    assert_eq!(greeter.greeting.text(), "hello");
    assert_eq!(ctx.lookup("greeting", 0).len(), 1);
    ctx.close().unwrap();
}

#[derive(Bean, Default)]
struct LazyGreeter {
    #[inject(lazy)]
    greeting: Inject<dyn Greeting>,
}

#[test]
fn test_lazy_scalar_through_factory_is_rejected() {
    let err = Context::new(beans![LazyGreeter::default(), GreetingFactory]).err().unwrap();
    assert!(matches!(err, Error::Declaration { .. }), "{err}");
}

trait Engine: Send + Sync {
    fn label(&self) -> &'static str;
}

#[derive(Bean, Default)]
#[bean(provides(dyn Engine))]
struct V8;

impl Engine for V8 {
    fn label(&self) -> &'static str {
        "v8"
    }
}

#[derive(Bean, Default)]
#[bean(factory)]
struct EngineFactory {
    shared_only: bool,
}

impl FactoryBean for EngineFactory {
    fn object(&self) -> anyhow::Result<Product> {
        if self.shared_only {
            return Ok(Product::shared(Arc::new(V8)));
        }
        Ok(Product::bean(V8)?)
    }

    fn object_type(&self) -> TypeKey {
        TypeKey::of::<V8>()
    }

    fn object_interfaces(&self) -> Vec<TypeKey> {
        V8::definition().interfaces()
    }
}

#[derive(Bean, Default)]
struct Car {
    #[inject]
    engine: Inject<dyn Engine>,
}

#[test]
fn test_concrete_product_fills_trait_object_field() {
    let ctx = Context::new(beans![EngineFactory::default(), Car::default()]).unwrap();

    let car = ctx.bean::<Car>(0)[0].object::<Car>().unwrap();
    assert_eq!(car.engine.label(), "v8");

    let engines = ctx.bean::<dyn Engine>(0);
    assert_eq!(engines.len(), 1);
    assert!(engines[0].is_factory_product());
    assert!(engines[0].implements(TypeKey::of::<V8>()));
    assert!(engines[0].implements(TypeKey::of::<dyn Engine>()));
    ctx.close().unwrap();
}

#[test]
fn test_product_missing_declared_interface() {
    let err = Context::new(beans![
        EngineFactory { shared_only: true },
        Car::default(),
    ])
    .unwrap_err();
    assert!(err.to_string().contains("can not be used as 'dyn"), "{}", err);
}
