//! Integration tests for name resolution through the loader.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Barrier,
    },
    thread,
    time::Duration,
};

use shadowloader::{
    classfile::{ClassAccessFlags, ClassBuilder},
    prelude::*,
};

fn plain(name: &str) -> Result<Vec<u8>> {
    ClassBuilder::new(name).default_constructor().to_bytes()
}

fn interface(name: &str) -> Result<Vec<u8>> {
    ClassBuilder::new(name)
        .access(ClassAccessFlags::PUBLIC | ClassAccessFlags::INTERFACE | ClassAccessFlags::ABSTRACT)
        .to_bytes()
}

/// Counts fetches and takes its time answering them.
struct SlowSource {
    inner: MemorySource,
    fetches: AtomicUsize,
    delay: Duration,
}

impl ByteSource for SlowSource {
    fn fetch(&self, name: &str) -> Result<Option<Vec<u8>>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        self.inner.fetch(name)
    }
}

/// Loader over `units`, each registered with the parent and the byte source.
fn loader_for(
    units: &[Vec<u8>],
    policy: PackagePolicy,
) -> Result<Loader<MemoryHost, PackagePolicy, MemorySource>> {
    let mut host = MemoryHost::new();
    let mut source = MemorySource::new();
    for bytes in units {
        let name = ClassFile::parse(bytes)?.java_name();
        source.insert(&name, bytes.clone());
        host = host.with_parent_unit(bytes.clone())?;
    }
    Ok(Loader::new(host, policy, source, Transformer::default()))
}

#[test]
fn test_unowned_names_are_delegated() -> Result<()> {
    let loader = loader_for(
        &[plain("lib/Helper")?],
        PackagePolicy::new().instrument_package("app"),
    )?;

    let first = loader.resolve("lib.Helper")?;
    let second = loader.resolve("lib.Helper")?;

    assert_eq!(first.origin(), Origin::Parent);
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(loader.host().definition_count(), 0);
    assert_eq!(loader.resolved_count(), 1);
    Ok(())
}

#[test]
fn test_owned_unit_is_instrumented_once() -> Result<()> {
    let loader = loader_for(&[plain("app/Widget")?], PackagePolicy::new().instrument_package("app"))?;

    let first = loader.resolve("app.Widget")?;
    let second = loader.resolve("app.Widget")?;

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.origin(), Origin::Defined);
    assert_eq!(loader.host().definition_count(), 1);

    let marker = &loader.transformer().config().marker_field;
    assert!(first.class()?.field(marker).is_some());
    Ok(())
}

#[test]
fn test_uninstrumented_owned_unit_is_byte_exact() -> Result<()> {
    let bytes = interface("app/Listener")?;
    let loader = loader_for(&[bytes.clone()], PackagePolicy::new().instrument_package("app"))?;

    let unit = loader.resolve("app.Listener")?;

    assert_eq!(unit.origin(), Origin::Defined);
    assert_eq!(unit.bytes(), bytes.as_slice());
    Ok(())
}

#[test]
fn test_missing_bytes_are_not_found() -> Result<()> {
    let loader = Loader::new(
        MemoryHost::new(),
        PackagePolicy::new().instrument_package("app"),
        MemorySource::new(),
        Transformer::default(),
    );

    let error = loader.resolve("app.Ghost").unwrap_err();
    match &error {
        Error::ResolutionFailed { name, .. } => assert_eq!(name, "app.Ghost"),
        other => panic!("expected a resolution failure, got {other:?}"),
    }
    assert!(matches!(error.root_cause(), Error::NotFound(name) if name == "app.Ghost"));
    assert!(!loader.is_resolved("app.Ghost"));
    Ok(())
}

#[test]
fn test_transform_failure_is_not_cached() -> Result<()> {
    let broken = ClassBuilder::new("app/Broken")
        .method(
            MethodAccessFlags::PUBLIC,
            "<init>",
            "()V",
            |gen| gen.emit(shadowloader::assembly::opcodes::RETURN),
        )
        .to_bytes()?;
    let loader = loader_for(&[broken], PackagePolicy::new().instrument_package("app"))?;

    for _ in 0..2 {
        let error = loader.resolve("app.Broken").unwrap_err();
        assert!(matches!(error.root_cause(), Error::TransformFailure { .. }));
    }
    assert_eq!(loader.host().definition_count(), 0);
    Ok(())
}

#[test]
fn test_concurrent_resolution_defines_once() -> Result<()> {
    const THREADS: usize = 8;

    let bytes = plain("app/Foo")?;
    let loader = Loader::new(
        MemoryHost::new().with_parent_unit(bytes.clone())?,
        PackagePolicy::new().instrument_package("app"),
        SlowSource {
            inner: MemorySource::new().with_unit("app.Foo", bytes),
            fetches: AtomicUsize::new(0),
            delay: Duration::from_millis(50),
        },
        Transformer::default(),
    );

    let barrier = Barrier::new(THREADS);
    let handles: Vec<Arc<MemoryUnit>> = thread::scope(|scope| {
        let workers: Vec<_> = (0..THREADS)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    loader.resolve("app.Foo")
                })
            })
            .collect();
        workers
            .into_iter()
            .map(|worker| worker.join().expect("worker panicked"))
            .collect::<Result<Vec<_>>>()
    })?;

    assert_eq!(handles.len(), THREADS);
    assert!(handles.iter().all(|handle| Arc::ptr_eq(handle, &handles[0])));
    assert_eq!(loader.host().definition_count(), 1);
    assert_eq!(loader.source().fetches.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn test_preload_mixes_owned_and_delegated() -> Result<()> {
    let loader = loader_for(
        &[plain("app/A")?, plain("app/B")?, plain("lib/C")?],
        PackagePolicy::new().instrument_package("app"),
    )?;

    let results = loader.preload(&["app.A", "lib.C", "app.B", "app.Missing"]);

    assert_eq!(results.len(), 4);
    assert_eq!(results[0].as_ref().map(|unit| unit.origin()).ok(), Some(Origin::Defined));
    assert_eq!(results[1].as_ref().map(|unit| unit.origin()).ok(), Some(Origin::Parent));
    assert_eq!(results[2].as_ref().map(|unit| unit.origin()).ok(), Some(Origin::Defined));
    assert!(results[3].is_err());
    assert_eq!(loader.host().definition_count(), 2);
    Ok(())
}
