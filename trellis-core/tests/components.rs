use std::sync::Arc;

use trellis_core::prelude::*;

#[derive(Bean, Default)]
#[bean(component)]
struct AuditLog;

#[derive(Bean, Default)]
#[bean(component, initializing)]
struct Indexer {
    #[inject]
    audit: Inject<AuditLog>,
}

impl InitializingBean for Indexer {
    fn post_construct(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.audit.is_injected(), "audit log missing");
        Ok(())
    }
}

mod plugins {
    use trellis_core::prelude::*;

    #[derive(Bean, Default)]
    #[bean(component)]
    pub struct Exporter;
}

#[test]
fn test_scanner_finds_registered_components() {
    let scanner = ComponentScanner::new();
    assert_eq!(
        scanner.names(),
        vec![
            "components::AuditLog",
            "components::Indexer",
            "components::plugins::Exporter",
        ]
    );

    let ctx = Context::new(vec![Scan::scanner(scanner)]).unwrap();
    assert_eq!(ctx.bean::<AuditLog>(0).len(), 1);
    assert_eq!(ctx.bean::<Indexer>(0)[0].lifecycle(), Lifecycle::Initialized);
    assert_eq!(ctx.bean::<plugins::Exporter>(0).len(), 1);
    ctx.close().unwrap();
}

#[test]
fn test_filtered_scanner() {
    let scanner = ComponentScanner::filtered(|name| name.contains("::plugins::"));
    assert_eq!(scanner.names(), vec!["components::plugins::Exporter"]);

    let ctx = Context::new(vec![Scan::scanner(scanner)]).unwrap();
    assert_eq!(ctx.bean::<plugins::Exporter>(0).len(), 1);
    assert!(ctx.bean::<AuditLog>(0).is_empty());
    ctx.close().unwrap();
}

#[test]
fn test_components_mix_with_explicit_beans() {
    let audit = Arc::new(AuditLog);
    let ctx = Context::new(beans![
        Scan::shared(audit.clone()),
        Scan::scanner(ComponentScanner::filtered(|name| name.ends_with("::Indexer"))),
    ])
    .unwrap();

    let indexer = ctx.bean::<Indexer>(0)[0].object::<Indexer>().unwrap();
    assert!(Arc::ptr_eq(indexer.audit.get().unwrap(), &audit));
    ctx.close().unwrap();
}
