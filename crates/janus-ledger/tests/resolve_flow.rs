use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use janus_ledger::cas::{Cas, archive_directory, hash_archive};
use janus_ledger::resolver::{load_lockfile, load_manifest, save_lockfile};
use janus_ledger::transport::{
    FetchResult, FileTransport, GitOutput, GitRunner, GitTransport, Transport, TransportError,
    TransportRegistry,
};
use janus_ledger::{CapabilityChange, Resolver, ResolverError, prompt_capability_changes};
use janus_schema::{
    Capability, ContentId, GitRef, Lockfile, Manifest, PackageRef, ResolvedPackage, Source,
};
use tempfile::{TempDir, tempdir};

/// Materializes a fixed tree for every clone.
struct FakeGit {
    files: Vec<(&'static str, &'static str)>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl GitRunner for FakeGit {
    fn run(&self, args: &[&str], _cwd: Option<&Path>) -> Result<GitOutput, TransportError> {
        self.calls.lock().unwrap().push(args.join(" "));
        if args[0] == "clone" {
            let dest = PathBuf::from(args[args.len() - 1]);
            for (path, body) in &self.files {
                let file = dest.join(path);
                fs::create_dir_all(file.parent().unwrap()).unwrap();
                fs::write(file, body).unwrap();
            }
        }
        Ok(GitOutput {
            status: Some(0),
            ..GitOutput::default()
        })
    }
}

/// Claims schemes and fails the test if it is ever asked to fetch.
struct UnreachableTransport;

impl Transport for UnreachableTransport {
    fn name(&self) -> &'static str {
        "unreachable"
    }

    fn supports_scheme(&self, scheme: &str) -> bool {
        matches!(scheme, "file" | "https" | "git+https")
    }

    fn fetch(&self, url: &str) -> Result<FetchResult, TransportError> {
        panic!("cache hit expected, but {url} was fetched");
    }
}

/// Serves fixed bytes for `mem://` URLs.
struct MemTransport(&'static [u8]);

impl Transport for MemTransport {
    fn name(&self) -> &'static str {
        "mem"
    }

    fn supports_scheme(&self, scheme: &str) -> bool {
        scheme == "mem"
    }

    fn fetch(&self, _url: &str) -> Result<FetchResult, TransportError> {
        Ok(FetchResult {
            content: self.0.to_vec(),
            content_id: hash_archive(self.0),
            metadata: BTreeMap::from([("version".to_string(), "2.0.0".to_string())]),
        })
    }
}

struct Workspace {
    _dir: TempDir,
    project: PathBuf,
    cas_root: PathBuf,
    deps: PathBuf,
}

fn workspace() -> Workspace {
    let dir = tempdir().unwrap();
    let project = dir.path().join("project");
    let cas_root = dir.path().join("cas");
    let deps = dir.path().join("deps");
    fs::create_dir_all(&project).unwrap();
    fs::create_dir_all(&deps).unwrap();
    Workspace {
        _dir: dir,
        project,
        cas_root,
        deps,
    }
}

impl Workspace {
    fn cas(&self) -> Cas {
        Cas::with_root(&self.cas_root).unwrap()
    }

    fn resolver(&self) -> Resolver {
        Resolver::with_components(&self.project, self.cas(), TransportRegistry::with_defaults())
    }

    fn resolver_with(&self, transport: Box<dyn Transport>) -> Resolver {
        let mut registry = TransportRegistry::new();
        registry.register(transport);
        Resolver::with_components(&self.project, self.cas(), registry)
    }

    /// A local package directory with one source file.
    fn local_package(&self, name: &str, body: &str) -> Source {
        let dir = self.deps.join(name);
        fs::create_dir_all(dir.join("src")).unwrap();
        fs::write(dir.join("src/lib.jn"), body).unwrap();
        Source::Path { path: dir }
    }
}

fn manifest_with(deps: Vec<PackageRef>) -> Manifest {
    Manifest {
        name: "app".into(),
        version: "0.1.0".into(),
        dependencies: deps,
        dev_dependencies: Vec::new(),
    }
}

fn fs_cap(path: &str) -> Capability {
    Capability::new("fs").with_param("path", path)
}

#[test]
fn fresh_git_resolution_stores_and_pins() {
    let ws = workspace();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let git = GitTransport::with_runner(Box::new(FakeGit {
        files: vec![("src/json.jn", "fn parse() {}\r\n"), ("janus.pkg", "name \"json\"\n")],
        calls: Arc::clone(&calls),
    }));
    let resolver = ws.resolver_with(Box::new(git));

    let source = Source::Git {
        url: "https://example.com/json.git".into(),
        reference: GitRef::tag("v1.2.0"),
    };
    let manifest = manifest_with(vec![
        PackageRef::new("json", source.clone()).with_capability(fs_cap("/tmp")),
    ]);

    let result = resolver
        .resolve_from_manifest(&manifest, &Lockfile::new())
        .unwrap();

    assert_eq!(result.packages_added, vec!["json".to_string()]);
    assert!(result.packages_updated.is_empty());
    assert!(result.packages_removed.is_empty());
    // No previous pin, nothing to diff against.
    assert!(result.capability_changes.is_empty());

    let pinned = result.lockfile.get("json").unwrap();
    assert_eq!(pinned.version, "unknown");
    assert_eq!(pinned.source, source);
    assert_eq!(pinned.capabilities, vec![fs_cap("/tmp")]);
    assert_eq!(pinned.capability("fs"), Some(&fs_cap("/tmp")));
    assert_eq!(pinned.capability("net"), None);
    assert!(pinned.dependencies.is_empty());
    assert_eq!(result.lockfile.version, 1);

    let cas = resolver.cas();
    assert!(cas.exists(&pinned.content_id));
    assert!(cas.verify(&pinned.content_id).unwrap());
    assert_eq!(resolver.project_root(), ws.project.as_path());
    assert_eq!(
        resolver
            .registry()
            .find_transport("https://example.com/json.git")
            .map(|t| t.name()),
        Some("git")
    );

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].starts_with("clone --depth=1 --branch v1.2.0 -- https://example.com/json.git"));
}

#[test]
fn unchanged_pin_is_a_cache_hit() {
    let ws = workspace();
    let source = ws.local_package("util", "fn util() {}");
    let manifest = manifest_with(vec![
        PackageRef::new("util", source).with_capability(fs_cap("/tmp")),
    ]);

    let first = ws
        .resolver()
        .resolve_from_manifest(&manifest, &Lockfile::new())
        .unwrap();

    let second = ws
        .resolver_with(Box::new(UnreachableTransport))
        .resolve_from_manifest(&manifest, &first.lockfile)
        .unwrap();

    assert_eq!(second.lockfile, first.lockfile);
    assert!(!second.has_changes());
}

#[test]
fn changed_content_is_an_update() {
    let ws = workspace();
    let source = ws.local_package("util", "fn util() {}");
    let manifest = manifest_with(vec![PackageRef::new("util", source.clone())]);

    // Pinned to content the store no longer holds.
    let mut old = Lockfile::new();
    old.insert(ResolvedPackage {
        name: "util".into(),
        version: "unknown".into(),
        content_id: ContentId::digest(b"an older release"),
        source,
        capabilities: Vec::new(),
        dependencies: Vec::new(),
    });

    let result = ws.resolver().resolve_from_manifest(&manifest, &old).unwrap();
    assert_eq!(result.packages_updated, vec!["util".to_string()]);
    assert!(result.packages_added.is_empty());

    let expected = hash_archive(&archive_directory(&ws.deps.join("util")).unwrap());
    assert_eq!(result.lockfile.get("util").unwrap().content_id, expected);
}

#[test]
fn dropped_dependency_is_removed() {
    let ws = workspace();
    let keep = ws.local_package("keep", "keep");
    let drop = ws.local_package("drop", "drop");

    let both = manifest_with(vec![
        PackageRef::new("keep", keep.clone()),
        PackageRef::new("drop", drop),
    ]);
    let resolver = ws.resolver();
    let first = resolver.resolve_from_manifest(&both, &Lockfile::new()).unwrap();
    assert_eq!(first.packages_added, vec!["keep".to_string(), "drop".to_string()]);

    let only_keep = manifest_with(vec![PackageRef::new("keep", keep)]);
    let second = resolver
        .resolve_from_manifest(&only_keep, &first.lockfile)
        .unwrap();
    assert_eq!(second.packages_removed, vec!["drop".to_string()]);
    assert!(!second.lockfile.contains("drop"));
    assert!(second.lockfile.contains("keep"));
}

#[test]
fn capability_edits_are_reported() {
    let ws = workspace();
    let source = ws.local_package("io", "io");
    let resolver = ws.resolver();

    let before = manifest_with(vec![
        PackageRef::new("io", source.clone())
            .with_capability(fs_cap("/tmp"))
            .with_capability(Capability::new("env")),
    ]);
    let first = resolver.resolve_from_manifest(&before, &Lockfile::new()).unwrap();

    let after = manifest_with(vec![
        PackageRef::new("io", source)
            .with_capability(fs_cap("/"))
            .with_capability(Capability::new("net").with_param("host", "example.com")),
    ]);
    let second = resolver.resolve_from_manifest(&after, &first.lockfile).unwrap();

    assert_eq!(
        second.capability_changes,
        vec![
            CapabilityChange::Removed {
                package: "io".into(),
                capability: Capability::new("env"),
            },
            CapabilityChange::Added {
                package: "io".into(),
                capability: Capability::new("net").with_param("host", "example.com"),
            },
            CapabilityChange::Modified {
                package: "io".into(),
                old: fs_cap("/tmp"),
                new: fs_cap("/"),
            },
        ]
    );
    // Same content, so not an update.
    assert!(second.packages_updated.is_empty());

    let mut out = Vec::new();
    assert!(!prompt_capability_changes(&second.capability_changes, &mut out).unwrap());
    assert!(matches!(
        second.ensure_no_capability_changes(),
        Err(ResolverError::CapabilityChangeDetected(3))
    ));
}

#[test]
fn first_declaration_wins() {
    let ws = workspace();
    let runtime = ws.local_package("a-runtime", "runtime");
    let dev = ws.local_package("a-dev", "dev");

    let manifest = Manifest {
        dependencies: vec![PackageRef::new("a", runtime.clone())],
        dev_dependencies: vec![PackageRef::new("a", dev)],
        ..Manifest::default()
    };
    let result = ws
        .resolver()
        .resolve_from_manifest(&manifest, &Lockfile::new())
        .unwrap();

    assert_eq!(result.lockfile.len(), 1);
    assert_eq!(result.lockfile.get("a").unwrap().source, runtime);
    assert_eq!(result.packages_added, vec!["a".to_string()]);
}

#[test]
fn missing_path_is_dependency_not_found() {
    let ws = workspace();
    let manifest = manifest_with(vec![PackageRef::new(
        "ghost",
        Source::Path {
            path: ws.deps.join("ghost"),
        },
    )]);
    let err = ws
        .resolver()
        .resolve_from_manifest(&manifest, &Lockfile::new())
        .unwrap_err();
    assert!(matches!(err, ResolverError::DependencyNotFound { name, .. } if name == "ghost"));
}

#[test]
fn tar_checksum_is_enforced() {
    let ws = workspace();
    let good = hash_archive(b"tarball");

    let pinned = |checksum: &str| {
        manifest_with(vec![PackageRef::new(
            "blob",
            Source::Tar {
                url: "mem://blob.tar".into(),
                checksum: Some(checksum.to_string()),
            },
        )])
    };

    let resolver = ws.resolver_with(Box::new(MemTransport(b"tarball")));
    let result = resolver
        .resolve_from_manifest(&pinned(&good.to_hex()), &Lockfile::new())
        .unwrap();
    let blob = result.lockfile.get("blob").unwrap();
    assert_eq!(blob.content_id, good);
    assert_eq!(blob.version, "2.0.0");

    let wrong = hash_archive(b"other").to_hex();
    let err = resolver
        .resolve_from_manifest(&pinned(&wrong), &Lockfile::new())
        .unwrap_err();
    assert!(matches!(
        err,
        ResolverError::IntegrityCheckFailed { name, expected, actual }
            if name == "blob" && expected == wrong && actual == good.to_hex()
    ));

    let err = resolver
        .resolve_from_manifest(&pinned("sha256:not-a-content-id"), &Lockfile::new())
        .unwrap_err();
    assert!(matches!(err, ResolverError::IntegrityCheckFailed { .. }));
}

#[test]
fn add_dependency_then_commit() {
    let ws = workspace();
    let source = ws.local_package("util", "fn util() {}");
    let resolver = ws.resolver();

    let result = resolver
        .add_dependency("util", source.clone(), vec![fs_cap("/tmp")], false)
        .unwrap();
    assert_eq!(result.packages_added, vec!["util".to_string()]);
    assert!(result.capability_changes.is_empty());
    resolver.commit(&result, false).unwrap();

    let manifest = load_manifest(&ws.project).unwrap().unwrap();
    assert_eq!(
        manifest.dependencies,
        vec![PackageRef::new("util", source).with_capability(fs_cap("/tmp"))]
    );
    let lockfile = load_lockfile(&ws.project).unwrap().unwrap();
    assert_eq!(lockfile, result.lockfile);

    // Re-resolving the committed state changes nothing.
    let again = resolver.update_dependencies().unwrap();
    assert!(!again.has_changes());
    assert_eq!(again.lockfile, lockfile);
}

#[test]
fn add_dev_dependency_replaces_existing_declaration() {
    let ws = workspace();
    let old = ws.local_package("fixtures-old", "old");
    let new = ws.local_package("fixtures-new", "new");
    let resolver = ws.resolver();

    let first = resolver.add_dependency("fixtures", old, Vec::new(), false).unwrap();
    resolver.commit(&first, false).unwrap();

    let second = resolver
        .add_dependency("fixtures", new.clone(), Vec::new(), true)
        .unwrap();
    let manifest = second.manifest.as_ref().unwrap();
    assert!(manifest.dependencies.is_empty());
    assert_eq!(manifest.dev_dependencies, vec![PackageRef::new("fixtures", new)]);
    assert_eq!(second.packages_updated, vec!["fixtures".to_string()]);
}

#[test]
fn commit_requires_approval_for_capability_changes() {
    let ws = workspace();
    let source = ws.local_package("net", "net");
    let resolver = ws.resolver();

    let first = resolver
        .add_dependency("net", source.clone(), Vec::new(), false)
        .unwrap();
    resolver.commit(&first, false).unwrap();
    let committed = fs::read_to_string(ws.project.join("JANUS.lock")).unwrap();

    let widened = resolver
        .add_dependency(
            "net",
            source,
            vec![Capability::new("net").with_param("host", "*")],
            false,
        )
        .unwrap();
    assert_eq!(widened.capability_changes.len(), 1);

    assert!(matches!(
        resolver.commit(&widened, false),
        Err(ResolverError::UserRejectedChanges)
    ));
    assert_eq!(
        fs::read_to_string(ws.project.join("JANUS.lock")).unwrap(),
        committed
    );

    resolver.commit(&widened, true).unwrap();
    let lockfile = load_lockfile(&ws.project).unwrap().unwrap();
    assert_eq!(
        lockfile.get("net").unwrap().capabilities,
        vec![Capability::new("net").with_param("host", "*")]
    );
}

#[test]
fn update_without_manifest_fails() {
    let ws = workspace();
    assert!(matches!(
        ws.resolver().update_dependencies(),
        Err(ResolverError::ManifestNotFound(_))
    ));
}

#[test]
fn update_with_corrupt_lockfile_fails_but_add_ignores_it() {
    let ws = workspace();
    let source = ws.local_package("util", "util");
    fs::write(
        ws.project.join("janus.pkg"),
        format!(
            "name \"app\"\ndependency \"util\" {{\n    path \"{}\"\n}}\n",
            ws.deps.join("util").display()
        ),
    )
    .unwrap();
    fs::write(ws.project.join("JANUS.lock"), "not json").unwrap();

    let resolver = ws.resolver();
    assert!(matches!(
        resolver.update_dependencies(),
        Err(ResolverError::LockfileParse { .. })
    ));

    let result = resolver.add_dependency("other", source, Vec::new(), false).unwrap();
    assert_eq!(
        result.packages_added,
        vec!["util".to_string(), "other".to_string()]
    );
}

#[test]
fn relative_paths_resolve_from_project_root() {
    let ws = workspace();
    let vendored = ws.project.join("vendor/lib");
    fs::create_dir_all(&vendored).unwrap();
    fs::write(vendored.join("lib.jn"), "lib").unwrap();

    let manifest = manifest_with(vec![PackageRef::new(
        "lib",
        Source::Path {
            path: PathBuf::from("vendor/lib"),
        },
    )]);
    let result = ws
        .resolver()
        .resolve_from_manifest(&manifest, &Lockfile::new())
        .unwrap();
    assert_eq!(
        result.lockfile.get("lib").unwrap().content_id,
        hash_archive(&archive_directory(&vendored).unwrap())
    );
}

#[test]
fn lockfile_survives_save_and_load() {
    let ws = workspace();
    let source = ws.local_package("util", "util");
    let result = ws
        .resolver_with(Box::new(FileTransport))
        .resolve_from_manifest(
            &manifest_with(vec![PackageRef::new("util", source)]),
            &Lockfile::new(),
        )
        .unwrap();

    save_lockfile(&ws.project, &result.lockfile).unwrap();
    assert_eq!(
        load_lockfile(&ws.project).unwrap(),
        Some(result.lockfile.clone())
    );
}

#[test]
fn commit_keeps_hand_written_manifest() {
    let ws = workspace();
    let json = ws.local_package("json", "json");
    let original = format!(
        "// Hand-written project file\nname \"app\"\nlicense \"MIT\"\n\nworkspace {{\n    members \"a\"\n}}\n\ndependency \"json\" {{\n    path \"{}\"  // vendored\n}}\n",
        ws.deps.join("json").display()
    );
    fs::write(ws.project.join("janus.pkg"), &original).unwrap();

    let util = ws.local_package("util", "fn util() {}");
    let resolver = ws.resolver();
    let result = resolver
        .add_dependency("util", util.clone(), Vec::new(), false)
        .unwrap();
    resolver.commit(&result, false).unwrap();

    let text = fs::read_to_string(ws.project.join("janus.pkg")).unwrap();
    assert!(text.starts_with(&original));
    assert!(text.contains("// vendored"));

    let manifest = load_manifest(&ws.project).unwrap().unwrap();
    assert_eq!(manifest.name, "app");
    assert_eq!(
        manifest.dependencies,
        vec![
            PackageRef::new("json", json),
            PackageRef::new("util", util),
        ]
    );
}

#[test]
fn quoted_capability_keys_survive_commit() {
    let ws = workspace();
    let source = ws.local_package("io", "io");
    let resolver = ws.resolver();
    let capability = Capability::new("fs")
        .with_param("read only", "yes")
        .with_param("path", "/data");

    let result = resolver
        .add_dependency("io", source.clone(), vec![capability.clone()], false)
        .unwrap();
    resolver.commit(&result, false).unwrap();

    let manifest = load_manifest(&ws.project).unwrap().unwrap();
    assert_eq!(
        manifest.dependencies,
        vec![PackageRef::new("io", source).with_capability(capability)]
    );
    assert!(!resolver.update_dependencies().unwrap().has_changes());
}

#[test]
fn repeated_capability_is_rejected() {
    let ws = workspace();
    let source = ws.local_package("io", "io");

    let err = ws
        .resolver()
        .add_dependency("io", source, vec![fs_cap("/a"), fs_cap("/b")], false)
        .unwrap_err();
    assert!(matches!(
        err,
        ResolverError::InvalidCapability { package, .. } if package == "io"
    ));
    assert!(!ws.project.join("janus.pkg").exists());
    assert!(!ws.project.join("JANUS.lock").exists());
}

#[test]
fn repeated_capability_in_manifest_fails_to_load() {
    let ws = workspace();
    fs::write(
        ws.project.join("janus.pkg"),
        "dependency \"io\" {\n    path \"io\"\n    capability \"fs\" path=\"/a\"\n    capability \"fs\" path=\"/b\"\n}\n",
    )
    .unwrap();

    assert!(matches!(
        ws.resolver().update_dependencies(),
        Err(ResolverError::ManifestParse { .. })
    ));
}
