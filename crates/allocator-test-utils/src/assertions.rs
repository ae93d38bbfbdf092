//! Catalog state verification helpers.
//!
//! Assertions panic with the catalog's current contents so a failing test
//! shows what was left behind.

use allocator_metrics::catalog::InMemoryCatalog;

/// Assert that no metric is registered.
#[track_caller]
pub fn assert_catalog_empty(catalog: &InMemoryCatalog) {
    assert!(
        catalog.is_empty(),
        "expected empty catalog, found {:?}",
        catalog.names()
    );
}

/// Assert that every name in `names` is registered.
#[track_caller]
pub fn assert_registered<S: AsRef<str>>(catalog: &InMemoryCatalog, names: &[S]) {
    for name in names {
        assert!(
            catalog.contains(name.as_ref()),
            "expected {:?} to be registered, catalog has {:?}",
            name.as_ref(),
            catalog.names()
        );
    }
}

/// Assert that no name in `names` is registered.
#[track_caller]
pub fn assert_not_registered<S: AsRef<str>>(catalog: &InMemoryCatalog, names: &[S]) {
    for name in names {
        assert!(
            !catalog.contains(name.as_ref()),
            "expected {:?} to be unregistered",
            name.as_ref()
        );
    }
}

/// Assert that nothing is registered under `prefix`.
#[track_caller]
pub fn assert_no_names_with_prefix(catalog: &InMemoryCatalog, prefix: &str) {
    let residual = catalog.names_with_prefix(prefix);
    assert!(
        residual.is_empty(),
        "expected nothing under {prefix:?}, found {residual:?}"
    );
}

/// Assert the exact set of names registered under `prefix`.
#[track_caller]
pub fn assert_names_with_prefix(catalog: &InMemoryCatalog, prefix: &str, expected: &[&str]) {
    let mut expected: Vec<String> = expected.iter().map(ToString::to_string).collect();
    expected.sort();
    assert_eq!(catalog.names_with_prefix(prefix), expected);
}
