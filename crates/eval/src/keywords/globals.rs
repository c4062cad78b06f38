use crate::registry::{KeywordRegistry, KeywordSpec};
use crate::value::Value;

pub(super) fn register(registry: &KeywordRegistry) {
    registry.register(
        KeywordSpec::new("设置全局变量")
            .param("变量名", "name", "variable name")
            .param("值", "value", "value to store")
            .category("system/globals")
            .doc("Store a variable visible to every test process."),
        |inv| {
            let name = inv.args.string("name")?;
            let value = inv.args.get("value").cloned().unwrap_or_default();
            inv.executor.globals().set(&name, value.to_json())?;
            tracing::debug!(name = %name, "global variable set");
            Ok(Value::Null)
        },
    );

    registry.register(
        KeywordSpec::new("获取全局变量")
            .param("变量名", "name", "variable name")
            .category("system/globals")
            .doc("Read a global variable; null when absent."),
        |inv| {
            let name = inv.args.string("name")?;
            Ok(inv
                .executor
                .globals()
                .get(&name)?
                .map(Value::from)
                .unwrap_or_default())
        },
    );

    registry.register(
        KeywordSpec::new("删除全局变量")
            .param("变量名", "name", "variable name")
            .category("system/globals")
            .doc("Remove a global variable; returns whether it existed."),
        |inv| {
            let name = inv.args.string("name")?;
            Ok(Value::Bool(inv.executor.globals().delete(&name)?))
        },
    );

    registry.register(
        KeywordSpec::new("清除所有全局变量")
            .category("system/globals")
            .doc("Remove every global variable."),
        |inv| {
            inv.executor.globals().clear()?;
            tracing::info!("global variables cleared");
            Ok(Value::Null)
        },
    );
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use kwdsl_storage::{FileStore, GlobalStore};
    use serde_json::json;

    use crate::{Executor, KeywordRegistry, Value};

    #[test]
    fn keywords_go_through_the_shared_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileStore::new(dir.path()).unwrap());
        let mut ex = Executor::new(Arc::new(KeywordRegistry::with_builtins()), store.clone());

        ex.invoke_keyword(
            "设置全局变量",
            vec![("变量名".into(), "token".into()), ("值".into(), "abc".into())],
            1,
        )
        .unwrap();
        assert_eq!(store.get("token").unwrap(), Some(json!("abc")));

        let got = ex
            .invoke_keyword("获取全局变量", vec![("name".into(), "token".into())], 2)
            .unwrap();
        assert_eq!(got, Value::from("abc"));

        let deleted = ex
            .invoke_keyword("删除全局变量", vec![("变量名".into(), "token".into())], 3)
            .unwrap();
        assert_eq!(deleted, Value::Bool(true));

        store.set("a", json!(1)).unwrap();
        ex.invoke_keyword("清除所有全局变量", vec![], 4).unwrap();
        assert!(store.snapshot().unwrap().is_empty());
    }
}
