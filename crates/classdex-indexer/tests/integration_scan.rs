//! End-to-end scans over real class-file bytes: directory, jar and tar
//! roots through `ScanSession`, queried through `Classdex`.

mod common;

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::Path;

use common::{ClassBytes, Field, Method};

use classdex_core::Store;
use classdex_indexer::{Classdex, ClassFileAdapter, ScanSession, ScannerKind};

fn scan(root: &Path, kinds: impl IntoIterator<Item = ScannerKind>) -> Classdex {
    let report = ScanSession::new(ClassFileAdapter::new())
        .add_root(root.display().to_string())
        .add_scanner_kinds(kinds)
        .run()
        .unwrap();
    assert!(report.errors.is_empty(), "scan errors: {:?}", report.errors);
    Classdex::from_report(report)
}

fn snapshot(store: &Store) -> BTreeMap<String, Vec<(String, BTreeSet<String>)>> {
    store
        .index_names()
        .into_iter()
        .map(|name| {
            let entries = store.index(&name).unwrap().entries();
            (name, entries)
        })
        .collect()
}

/// A small project: an inheritable tag on an interface chain, a plain
/// tag on one leaf class, a service with parameter metadata, a caller
/// with body references and a deployment descriptor resource.
fn project_classes() -> Vec<ClassBytes> {
    vec![
        ClassBytes::annotation("com.t.AI1").annotate("java.lang.annotation.Inherited"),
        ClassBytes::annotation("com.t.AI2"),
        ClassBytes::annotation("com.t.AC3"),
        ClassBytes::interface("com.t.I1").annotate("com.t.AI1"),
        ClassBytes::interface("com.t.I2")
            .implements("com.t.I1")
            .annotate("com.t.AI2"),
        ClassBytes::class("com.t.C1").implements("com.t.I2"),
        ClassBytes::class("com.t.C2").extends("com.t.C1"),
        ClassBytes::class("com.t.C3")
            .extends("com.t.C1")
            .annotate("com.t.AC3"),
        ClassBytes::class("com.t.Service")
            .field(Field::new("registry", "Ljava/util/Map;").annotate("com.t.Injected"))
            .method(
                Method::new("handle", "(I[Ljava/lang/String;)V")
                    .annotate("com.t.Handler")
                    .param_annotation(1, "com.t.Named")
                    .param_names(&["count", "labels"]),
            ),
        ClassBytes::class("com.t.Caller").method(
            Method::new("run", "()V")
                .calls("com.t.Helper", "assist", "(I)V", 7)
                .reads_field("com.t.Holder", "count", "I", 9),
        ),
    ]
}

fn write_project(root: &Path) {
    for class in project_classes() {
        class.write_to(root);
    }
    fs::create_dir_all(root.join("WEB-INF")).unwrap();
    fs::write(root.join("WEB-INF/web.xml"), b"<web-app/>").unwrap();
}

#[test]
fn test_inherited_tags_reach_subtypes_across_interfaces() {
    let root = tempfile::tempdir().unwrap();
    write_project(root.path());
    let dex = scan(
        root.path(),
        [ScannerKind::SubTypes, ScannerKind::TypeAnnotations],
    );

    // AI1 carries the inheritance marker, so the whole chain under I1 is
    // tagged
    assert_eq!(
        dex.types_tagged_with("com.t.AI1", true).unwrap(),
        vec!["com.t.C1", "com.t.C2", "com.t.C3", "com.t.I1", "com.t.I2"]
    );

    // AI2 and AC3 carry no marker and stay on their direct carriers
    assert_eq!(
        dex.types_tagged_with("com.t.AI2", true).unwrap(),
        vec!["com.t.I2"]
    );
    assert_eq!(
        dex.types_tagged_with("com.t.AC3", true).unwrap(),
        vec!["com.t.C3"]
    );

    assert_eq!(
        dex.subtypes_of("com.t.C1").unwrap(),
        vec!["com.t.C2", "com.t.C3"]
    );
}

#[test]
fn test_overloaded_method_keys_stay_distinct() {
    let root = tempfile::tempdir().unwrap();
    ClassBytes::class("com.t.Overloads")
        .method(Method::new("m1", "(I[Ljava/lang/String;)V").annotate("com.t.Marked"))
        .method(Method::new("m1", "([[I[[Ljava/lang/String;)V"))
        .write_to(root.path());
    let dex = scan(
        root.path(),
        [
            ScannerKind::MethodAnnotations,
            ScannerKind::MethodParameters,
        ],
    );

    // only the annotated overload carries the tag
    assert_eq!(
        dex.methods_tagged_with("com.t.Marked").unwrap(),
        vec!["com.t.Overloads.m1(int, java.lang.String[])"]
    );
    assert_eq!(
        dex.methods_with_param_types(&["int[][]", "java.lang.String[][]"])
            .unwrap(),
        vec!["com.t.Overloads.m1(int[][], java.lang.String[][])"]
    );
}

#[test]
fn test_member_usages_resolve_to_call_sites() {
    let root = tempfile::tempdir().unwrap();
    write_project(root.path());
    let dex = scan(root.path(), [ScannerKind::MemberUsage]);

    assert_eq!(
        dex.usages_of("com.t.Helper.assist(int)").unwrap(),
        vec!["com.t.Caller.run() #7"]
    );
    assert_eq!(
        dex.usages_of("com.t.Holder.count").unwrap(),
        vec!["com.t.Caller.run() #9"]
    );
    assert!(dex.usages_of("com.t.Helper.other()").unwrap().is_empty());
}

#[test]
fn test_parameter_metadata_end_to_end() {
    let root = tempfile::tempdir().unwrap();
    write_project(root.path());
    let dex = scan(
        root.path(),
        [
            ScannerKind::MethodParameters,
            ScannerKind::MethodParameterNames,
            ScannerKind::FieldAnnotations,
        ],
    );

    let key = "com.t.Service.handle(int, java.lang.String[])";
    assert_eq!(
        dex.methods_with_param_types(&["int", "java.lang.String[]"])
            .unwrap(),
        vec![key]
    );
    assert_eq!(
        dex.methods_with_any_param_tagged("com.t.Named").unwrap(),
        vec![key]
    );
    assert!(dex
        .methods_returning("void")
        .unwrap()
        .contains(&key.to_string()));
    assert_eq!(
        dex.method_param_names(key).unwrap(),
        vec!["count", "labels"]
    );
    assert_eq!(
        dex.fields_tagged_with("com.t.Injected").unwrap(),
        vec!["com.t.Service.registry"]
    );
}

#[test]
fn test_jar_and_tar_roots_match_the_directory_scan() {
    let dir = tempfile::tempdir().unwrap();
    let plain = dir.path().join("classes");
    write_project(&plain);

    let jar = dir.path().join("fixture.jar");
    let mut writer = zip::ZipWriter::new(fs::File::create(&jar).unwrap());
    let options = zip::write::SimpleFileOptions::default();
    for class in project_classes() {
        writer.start_file(class.relative_path(), options).unwrap();
        writer.write_all(&class.build()).unwrap();
    }
    writer.start_file("WEB-INF/web.xml", options).unwrap();
    writer.write_all(b"<web-app/>").unwrap();
    writer.finish().unwrap();

    let tar = dir.path().join("fixture.tar");
    let mut builder = tar::Builder::new(Vec::new());
    for class in project_classes() {
        let data = class.build();
        let mut header = tar::Header::new_ustar();
        header.set_mode(0o644);
        header.set_size(data.len() as u64);
        header.set_entry_type(tar::EntryType::Regular);
        builder
            .append_data(&mut header, class.relative_path(), data.as_slice())
            .unwrap();
    }
    let mut header = tar::Header::new_ustar();
    header.set_mode(0o644);
    header.set_size(10);
    header.set_entry_type(tar::EntryType::Regular);
    builder
        .append_data(&mut header, "WEB-INF/web.xml", &b"<web-app/>"[..])
        .unwrap();
    fs::write(&tar, builder.into_inner().unwrap()).unwrap();

    let kinds = [
        ScannerKind::SubTypes,
        ScannerKind::TypeAnnotations,
        ScannerKind::Resources,
    ];
    let from_dir = scan(&plain, kinds);
    let from_jar = scan(&jar, kinds);
    let from_tar = scan(&tar, kinds);

    assert_eq!(snapshot(from_dir.store()), snapshot(from_jar.store()));
    assert_eq!(snapshot(from_dir.store()), snapshot(from_tar.store()));

    // the descriptor lands in the resource index, never the hierarchy
    assert_eq!(
        from_tar.resources(r"web\.xml").unwrap(),
        vec!["WEB-INF/web.xml"]
    );
    let subtypes = from_tar.store().index("SubTypes").unwrap();
    assert!(!subtypes.contains_key("web.xml"));
    assert!(!subtypes.contains_key("WEB-INF/web.xml"));
}

#[test]
fn test_parallel_scan_matches_sequential_over_class_bytes() {
    let root = tempfile::tempdir().unwrap();
    write_project(root.path());

    let sequential = ScanSession::new(ClassFileAdapter::new())
        .add_root(root.path().display().to_string())
        .add_scanner_kinds(ScannerKind::ALL)
        .run()
        .unwrap();
    let parallel = ScanSession::new(ClassFileAdapter::new())
        .add_root(root.path().display().to_string())
        .add_scanner_kinds(ScannerKind::ALL)
        .workers(8)
        .run()
        .unwrap();

    assert!(sequential.errors.is_empty());
    assert!(parallel.errors.is_empty());
    assert_eq!(sequential.scanned_entries, parallel.scanned_entries);
    assert_eq!(snapshot(&sequential.store), snapshot(&parallel.store));
}

#[test]
fn test_scanner_order_does_not_change_results_or_blame() {
    let root = tempfile::tempdir().unwrap();
    write_project(root.path());
    fs::write(root.path().join("com/t/Broken.class"), b"not a class").unwrap();

    let forward = [
        ScannerKind::SubTypes,
        ScannerKind::TypeAnnotations,
        ScannerKind::MethodAnnotations,
    ];
    let reversed = [
        ScannerKind::MethodAnnotations,
        ScannerKind::TypeAnnotations,
        ScannerKind::SubTypes,
    ];
    let run = |kinds: [ScannerKind; 3]| {
        ScanSession::new(ClassFileAdapter::new())
            .add_root(root.path().display().to_string())
            .add_scanner_kinds(kinds)
            .run()
            .unwrap()
    };
    let first = run(forward);
    let second = run(reversed);

    // the broken entry is blamed on the entry, whichever scanner built
    // the descriptor
    for report in [&first, &second] {
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].0, "com/t/Broken.class");
    }
    assert_eq!(snapshot(&first.store), snapshot(&second.store));
}

#[tokio::test]
async fn test_snapshot_round_trip_after_a_real_scan() {
    let root = tempfile::tempdir().unwrap();
    write_project(root.path());
    let dex = scan(
        root.path(),
        [
            ScannerKind::SubTypes,
            ScannerKind::TypeAnnotations,
            ScannerKind::MethodParameters,
            ScannerKind::Resources,
        ],
    );

    let out = tempfile::tempdir().unwrap();
    for name in ["index.json", "index.msgpack"] {
        let path = out.path().join(name);
        dex.save(&path).await.unwrap();
        let loaded = Classdex::load(&path).await.unwrap();
        assert_eq!(snapshot(dex.store()), snapshot(loaded.store()));
        assert_eq!(
            loaded.types_tagged_with("com.t.AI1", true).unwrap(),
            dex.types_tagged_with("com.t.AI1", true).unwrap()
        );
    }
}
