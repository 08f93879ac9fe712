//! Built-in module table.
//!
//! Every `implementationRef` and `dependencyRef` in the shipped catalog maps to
//! a factory here. The implementations are headless: mounting validates the
//! props and reports what would be on screen. The dependency managers inject
//! their runtime's scripts and stylesheets through the resource loader and
//! then wait for the runtime to come up.

use futures_util::future::BoxFuture;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use viewer_plugin_interface::{
    DependencyManager, DependencyModule, MountedView, ViewerContext, ViewerImplementation, ViewerProps,
};

use crate::loader::{ModuleContext, ModuleTable, ResourceLoader};

/// Implementation refs and the kind of content each one renders.
pub const IMPLEMENTATIONS: &[(&str, &str)] = &[
    ("ImageViewer", "image"),
    ("VideoViewer", "video"),
    ("AudioViewer", "audio"),
    ("Online3dViewer", "3D model"),
    ("GaussianSplatViewer", "gaussian splat"),
    ("PotreeViewer", "point cloud"),
    ("CesiumViewer", "3D tileset"),
    ("ColumnarViewer", "table"),
    ("PdfViewer", "PDF"),
    ("HtmlViewer", "HTML"),
    ("TextViewer", "text"),
    ("PreviewViewer", "preview"),
];

/// What a third-party runtime needs injected before it is usable.
#[derive(Debug)]
pub struct RuntimeManifest {
    /// Export the catalog names in `dependencyEntryPoint`; `None` means the
    /// module only offers its fallback manager.
    pub namespace: Option<&'static str>,
    /// Name of the runtime, for logs.
    pub name: &'static str,
    /// Loaded in order; later scripts may depend on earlier ones.
    pub scripts: &'static [&'static str],
    pub stylesheets: &'static [&'static str],
}

/// Dependency refs and their runtimes.
pub const RUNTIMES: &[(&str, RuntimeManifest)] = &[
    (
        "online3d",
        RuntimeManifest {
            namespace: None,
            name: "OV",
            scripts: &["viewers/online3d/o3dv.min.js"],
            stylesheets: &[],
        },
    ),
    (
        "babylonjs",
        RuntimeManifest {
            namespace: Some("BabylonDependencyManager"),
            name: "BABYLON",
            scripts: &[
                "viewers/babylonjs/babylon.js",
                "viewers/babylonjs/babylonjs.loaders.min.js",
            ],
            stylesheets: &[],
        },
    ),
    (
        "potree",
        RuntimeManifest {
            namespace: Some("PotreeDependencyManager"),
            name: "Potree",
            scripts: &[
                "viewers/potree/libs/jquery/jquery-3.1.1.min.js",
                "viewers/potree/libs/three.js/build/three.min.js",
                "viewers/potree/potree.js",
            ],
            stylesheets: &[
                "viewers/potree/potree.css",
                "viewers/potree/libs/jquery-ui/jquery-ui.min.css",
            ],
        },
    ),
    (
        "cesium",
        RuntimeManifest {
            namespace: Some("CesiumDependencyManager"),
            name: "Cesium",
            scripts: &["viewers/cesium/Cesium.js"],
            stylesheets: &["viewers/cesium/Widgets/widgets.css"],
        },
    ),
];

/// A viewer that renders nothing and describes what it was given.
#[derive(Debug)]
pub struct HeadlessViewer {
    id: String,
    kind: &'static str,
    custom_parameters: Map<String, Value>,
}

impl HeadlessViewer {
    pub fn new(id: impl Into<String>, kind: &'static str, custom_parameters: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            kind,
            custom_parameters,
        }
    }
}

impl ViewerImplementation for HeadlessViewer {
    fn id(&self) -> &str {
        &self.id
    }

    fn mount(&self, props: &ViewerProps, ctx: ViewerContext) -> Result<MountedView, String> {
        props.validate().map_err(|e| e.to_string())?;

        let keys = props.keys();
        let mut summary = format!(
            "{} viewer showing {} in {} mode",
            self.kind,
            keys.join(", "),
            props.viewer_mode
        );
        if ctx.dependencies.is_some() {
            summary.push_str(", runtime attached");
        }

        let parameters = props
            .custom_parameters
            .as_ref()
            .unwrap_or(&self.custom_parameters);
        if !parameters.is_empty() {
            let names: Vec<&str> = parameters.keys().map(String::as_str).collect();
            summary.push_str(&format!(" [{}]", names.join(", ")));
        }

        tracing::debug!(viewer = %self.id, keys = keys.len(), "Mounted headless viewer");
        Ok(MountedView {
            viewer_id: self.id.clone(),
            summary,
        })
    }

    fn unmount(&self) {
        tracing::debug!(viewer = %self.id, "Unmounted headless viewer");
    }
}

/// Injects one runtime's resources on behalf of a viewer.
pub struct RuntimeBundle {
    owner: String,
    manifest: &'static RuntimeManifest,
    resources: Arc<ResourceLoader>,
    ready: AtomicBool,
}

impl RuntimeBundle {
    pub fn new(owner: impl Into<String>, manifest: &'static RuntimeManifest, resources: Arc<ResourceLoader>) -> Self {
        Self {
            owner: owner.into(),
            manifest,
            resources,
            ready: AtomicBool::new(false),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

impl DependencyManager for RuntimeBundle {
    fn load(&self) -> BoxFuture<'_, Result<(), String>> {
        Box::pin(async move {
            if self.is_ready() {
                return Ok(());
            }

            for url in self.manifest.stylesheets {
                self.resources
                    .load_stylesheet(&self.owner, url)
                    .await
                    .map_err(|e| e.to_string())?;
            }
            // Each script's load event fires after it has run, so the runtime
            // is up once the last one reports.
            for url in self.manifest.scripts {
                self.resources
                    .load_script(&self.owner, url)
                    .await
                    .map_err(|e| e.to_string())?;
            }

            self.ready.store(true, Ordering::SeqCst);
            tracing::info!(plugin = %self.owner, runtime = self.manifest.name, "Runtime ready");
            Ok(())
        })
    }

    fn cleanup(&self) -> Result<(), String> {
        if self.ready.swap(false, Ordering::SeqCst) {
            tracing::debug!(plugin = %self.owner, runtime = self.manifest.name, "Runtime released");
        }
        Ok(())
    }
}

/// A loaded runtime module exposing its manager under the catalog namespace.
pub struct RuntimeModule {
    namespace: Option<&'static str>,
    manager: Arc<RuntimeBundle>,
}

impl DependencyModule for RuntimeModule {
    fn entry_point(&self, namespace: &str) -> Option<Arc<dyn DependencyManager>> {
        if self.namespace == Some(namespace) {
            Some(self.manager.clone() as Arc<dyn DependencyManager>)
        } else {
            None
        }
    }

    fn fallback(&self) -> Option<Arc<dyn DependencyManager>> {
        match self.namespace {
            None => Some(self.manager.clone() as Arc<dyn DependencyManager>),
            Some(_) => None,
        }
    }
}

/// The module table behind the shipped catalog.
pub fn module_table() -> ModuleTable {
    let mut table = ModuleTable::new();

    for &(reference, kind) in IMPLEMENTATIONS {
        table.register_implementation(reference, move |ctx: ModuleContext| async move {
            Ok::<_, anyhow::Error>(
                Arc::new(HeadlessViewer::new(ctx.plugin_id, kind, ctx.custom_parameters))
                    as Arc<dyn ViewerImplementation>,
            )
        });
    }

    for (reference, manifest) in RUNTIMES {
        table.register_dependency(*reference, move |ctx: ModuleContext| async move {
            Ok::<_, anyhow::Error>(Arc::new(RuntimeModule {
                namespace: manifest.namespace,
                manager: Arc::new(RuntimeBundle::new(ctx.plugin_id, manifest, ctx.resources)),
            }) as Arc<dyn DependencyModule>)
        });
    }

    table
}
