mod bean_attr;
mod bean_impl;
mod field_attr;

use proc_macro::TokenStream;
use proc_macro_error::proc_macro_error;

/// Bean 派生宏
///
/// 用法：
/// ```ignore
/// #[derive(Bean)]
/// #[bean(named, ordered)]                  // 可选：声明实现了 NamedBean / OrderedBean
/// #[bean(initializing, disposable)]        // 可选：post_construct / destroy 钩子
/// #[bean(factory)]                         // 可选：实现了 FactoryBean
/// #[bean(resolver)]                        // 可选：实现了 PropertyResolver
/// #[bean(component)]                       // 可选：通过 inventory 注册，需要 Default
/// #[bean(provides(dyn UserService))]       // 可选：对外提供的 trait object 视图
/// struct UserServiceImpl {
///     #[inject]
///     repo: Inject<dyn UserRepository>,
///     #[inject(bean = "primaryCache", optional, lazy, level = 2)]
///     cache: Inject<Cache>,
///     #[inject]
///     listeners: InjectList<dyn Listener>,
///     #[value("user.page.size", default = 20)]
///     page_size: Value<usize>,
///     #[value("user.since", layout = "%Y-%m-%d")]
///     since: Value<chrono::NaiveDate>,
/// }
/// ```
///
/// 未标记的字段不参与注入。
#[proc_macro_derive(Bean, attributes(bean, inject, value))]
#[proc_macro_error]
pub fn derive_bean(input: TokenStream) -> TokenStream {
    bean_impl::derive_bean_impl(input)
}
