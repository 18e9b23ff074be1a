use std::sync::Arc;

use trellis_core::prelude::*;

// ==================== 配置 ====================

const APPLICATION_PROPERTIES: &str = "\
# 问候语配置
greeter.salutation = Hello
greeter.audience = world;team;reader
greeter.shout = false
";

// ==================== 业务接口 ====================

trait Greeting: Send + Sync {
    fn greet(&self, who: &str) -> String;
}

struct Polite {
    salutation: String,
    shout: bool,
}

impl Greeting for Polite {
    fn greet(&self, who: &str) -> String {
        let text = format!("{}, {}!", self.salutation, who);
        if self.shout {
            text.to_uppercase()
        } else {
            text
        }
    }
}

// ==================== Beans ====================

/// 根据属性生产 Greeting
#[derive(Bean, Default)]
#[bean(factory)]
struct GreetingFactory {
    #[value("greeter.salutation", default = "Hi")]
    salutation: Value<String>,
    #[value("greeter.shout", default = false)]
    shout: Value<bool>,
}

impl FactoryBean for GreetingFactory {
    fn object(&self) -> anyhow::Result<Product> {
        let greeting: Arc<dyn Greeting> = Arc::new(Polite {
            salutation: self.salutation.to_string(),
            shout: *self.shout,
        });
        Ok(Product::shared(greeting).named("greeting"))
    }

    fn object_type(&self) -> TypeKey {
        TypeKey::of::<dyn Greeting>()
    }
}

/// 启动时向每位听众问候，关闭时道别
#[derive(Bean, Default)]
#[bean(component, initializing, disposable)]
struct ConsoleGreeter {
    #[inject]
    greeting: Inject<dyn Greeting>,
    #[value("greeter.audience")]
    audience: Value<Vec<String>>,
}

impl InitializingBean for ConsoleGreeter {
    fn post_construct(&self) -> anyhow::Result<()> {
        for who in self.audience.iter() {
            println!("   {}", self.greeting.greet(who));
        }
        Ok(())
    }
}

impl DisposableBean for ConsoleGreeter {
    fn destroy(&self) -> anyhow::Result<()> {
        println!("   Goodbye, {} listener(s)", self.audience.len());
        Ok(())
    }
}

/// 子上下文中的 bean，复用父上下文的 Greeting
#[derive(Bean, Default)]
struct NightShift {
    #[inject]
    greeting: Inject<dyn Greeting>,
}

// ==================== 主程序 ====================

fn main() -> anyhow::Result<()> {
    LoggingConfig::from_env().init()?;

    println!("\n╔════════════════════════════════════════════════════╗");
    println!("║           Trellis - Greeter Demo                   ║");
    println!("╚════════════════════════════════════════════════════╝\n");

    let config = ResourceSource::memory(
        "config",
        MemoryAssets::new().file("application.properties", APPLICATION_PROPERTIES),
    );

    println!("🚀 Assembling context...");
    let context = Context::builder()
        .scan(config)
        .scan(PropertySource::file("config:application.properties"))
        .scan(GreetingFactory::default())
        .scan(Scan::scanner(ComponentScanner::new()))
        .scan(ChildContext::new("night", beans![NightShift::default()]))
        .build()?;

    println!("\n📦 {}", context);
    for handle in context.bean::<dyn Greeting>(0) {
        println!("   {}", handle);
    }

    let night = context.children()[0].object()?;
    if let Some(shift) = night.bean::<NightShift>(1).first().and_then(|h| h.object::<NightShift>()) {
        println!("\n🌙 {}", shift.greeting.greet("night shift"));
    }

    println!("\n👋 Closing context...");
    context.close()?;
    tracing::info!("Greeter demo finished");
    Ok(())
}
