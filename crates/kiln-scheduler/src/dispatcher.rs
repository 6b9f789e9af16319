//! Builder dispatch.

use crate::error::{DispatchError, Result};
use futures::future::join_all;
use kiln_core::assembler::builder_root;
use kiln_core::ports::{CatalogProvider, ExecutionEngine, Submission};
use kiln_core::{DefinitionSet, FilterExpr, JobDescription, MatchReport, PipelineAssembler};
use kiln_core::{ResourceMatcher, Resolver};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of one dispatch.
#[derive(Debug, Clone)]
pub enum Dispatch {
    /// A job was assembled and accepted by the engine.
    Dispatched {
        job: JobDescription,
        submission: Submission,
    },
    /// No eligible `(worker, image)` pair right now.
    Unschedulable(MatchReport),
}

impl Dispatch {
    pub fn job(&self) -> Option<&JobDescription> {
        match self {
            Dispatch::Dispatched { job, .. } => Some(job),
            Dispatch::Unschedulable(_) => None,
        }
    }

    pub fn is_unschedulable(&self) -> bool {
        matches!(self, Dispatch::Unschedulable(_))
    }
}

/// Resolves, matches, assembles and submits builders.
///
/// Every dispatch takes a fresh catalog snapshot and works on it alone, so
/// concurrent dispatches share nothing mutable.
pub struct Dispatcher {
    definitions: Arc<DefinitionSet>,
    catalog: Arc<dyn CatalogProvider>,
    engine: Arc<dyn ExecutionEngine>,
    matcher: ResourceMatcher,
    job_root: String,
    properties: BTreeMap<String, String>,
}

impl Dispatcher {
    pub fn new(
        definitions: Arc<DefinitionSet>,
        catalog: Arc<dyn CatalogProvider>,
        engine: Arc<dyn ExecutionEngine>,
    ) -> Self {
        Self {
            definitions,
            catalog,
            engine,
            matcher: ResourceMatcher::new(),
            job_root: "/build".to_string(),
            properties: BTreeMap::new(),
        }
    }

    /// Parent directory of per-builder job roots.
    pub fn with_job_root(mut self, job_root: impl Into<String>) -> Self {
        self.job_root = job_root.into();
        self
    }

    /// Property overrides applied to every job.
    pub fn with_properties(mut self, properties: BTreeMap<String, String>) -> Self {
        self.properties = properties;
        self
    }

    /// The assembler for one builder; each builder gets its own directory.
    pub fn assembler(&self, builder: &str) -> Result<PipelineAssembler> {
        let root = builder_root(&self.job_root, builder)
            .ok_or_else(|| DispatchError::InvalidJobRoot(builder.to_string()))?;
        Ok(PipelineAssembler::new(root).with_properties(self.properties.clone()))
    }

    /// Dispatch one builder to the first eligible pair.
    pub async fn dispatch(&self, builder: &str) -> Result<Dispatch> {
        let resolved = Resolver::new(&self.definitions)
            .resolve(builder)
            .map_err(DispatchError::Resolution)?;
        let snapshot = self.catalog.snapshot().map_err(DispatchError::Catalog)?;

        let report = self.matcher.evaluate(&resolved, &snapshot);
        debug!(
            builder,
            workers = report.workers.len(),
            images = report.images.len(),
            "Evaluated resource filters"
        );

        let Some((worker, image)) = report.first_pair() else {
            warn!(
                builder,
                worker_filter = %describe(report.worker_filter.as_ref()),
                image_filter = %describe(report.image_filter.as_ref()),
                rejected_workers = report.rejected_workers.len(),
                rejected_images = report.rejected_images.len(),
                "No eligible worker/image pair"
            );
            return Ok(Dispatch::Unschedulable(report));
        };

        let job = self
            .assembler(builder)?
            .assemble(&resolved, (worker, image))
            .map_err(DispatchError::Assembly)?;

        info!(
            builder,
            worker = %job.worker,
            image = %job.image,
            steps = job.steps.len(),
            "Submitting job"
        );
        let submission = self
            .engine
            .submit(job.clone())
            .await
            .map_err(|source| DispatchError::Submission {
                builder: builder.to_string(),
                source,
            })?;
        debug!(builder, job_ref = %submission.job_ref, "Job accepted");

        Ok(Dispatch::Dispatched { job, submission })
    }

    /// Dispatch several builders concurrently. Results come back in input
    /// order; one failure does not affect the others.
    pub async fn dispatch_many<S: AsRef<str>>(&self, builders: &[S]) -> Vec<(String, Result<Dispatch>)> {
        join_all(builders.iter().map(|b| async move {
            let name = b.as_ref();
            (name.to_string(), self.dispatch(name).await)
        }))
        .await
    }
}

fn describe(filter: Option<&FilterExpr>) -> String {
    filter.map_or_else(|| "any".to_string(), |f| f.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kiln_core::attribute::Attribute;
    use kiln_core::resource::Resource;
    use kiln_core::{BuilderDefinition, StepSpec};
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    struct MockCatalog {
        workers: Mutex<Vec<Resource>>,
        images: Mutex<Vec<Resource>>,
        fail: bool,
    }

    impl MockCatalog {
        fn new(workers: Vec<Resource>, images: Vec<Resource>) -> Self {
            Self {
                workers: Mutex::new(workers),
                images: Mutex::new(images),
                fail: false,
            }
        }
    }

    impl CatalogProvider for MockCatalog {
        fn workers(&self) -> kiln_core::Result<Vec<Resource>> {
            if self.fail {
                return Err(kiln_core::Error::Catalog("connection refused".to_string()));
            }
            Ok(self.workers.lock().unwrap().clone())
        }

        fn images(&self) -> kiln_core::Result<Vec<Resource>> {
            Ok(self.images.lock().unwrap().clone())
        }
    }

    #[derive(Default)]
    struct MockEngine {
        submitted: Mutex<Vec<JobDescription>>,
        reject: bool,
    }

    #[async_trait]
    impl ExecutionEngine for MockEngine {
        async fn submit(&self, job: JobDescription) -> kiln_core::Result<Submission> {
            if self.reject {
                return Err(kiln_core::Error::Execution("queue full".to_string()));
            }
            let mut submitted = self.submitted.lock().unwrap();
            submitted.push(job);
            Ok(Submission {
                job_ref: format!("job-{}", submitted.len()),
            })
        }
    }

    fn definitions() -> Arc<DefinitionSet> {
        let mut base = BuilderDefinition::new("cpp");
        base.steps = Attribute::Replace(vec![StepSpec::new("build", "ninja").in_dir("cpp/build")]);

        let mut cuda = BuilderDefinition::new("cpp-cuda").with_parent("cpp");
        cuda.worker_filter = Attribute::Replace(FilterExpr::has_tag("cuda"));

        let orphan = BuilderDefinition::new("orphan").with_parent("missing");

        Arc::new([base, cuda, orphan].into_iter().collect())
    }

    fn catalog() -> MockCatalog {
        MockCatalog::new(
            vec![Resource::new("ursa-1"), Resource::new("ursa-2")],
            vec![Resource::new("cpp")],
        )
    }

    #[tokio::test]
    async fn test_dispatch_submits_first_pair() {
        let engine = Arc::new(MockEngine::default());
        let dispatcher = Dispatcher::new(definitions(), Arc::new(catalog()), engine.clone())
            .with_job_root("/srv/build/")
            .with_properties([("ncpus".to_string(), "8".to_string())].into());

        let outcome = dispatcher.dispatch("cpp").await.unwrap();
        let Dispatch::Dispatched { job, submission } = outcome else {
            panic!("expected a dispatched job");
        };
        assert_eq!(submission.job_ref, "job-1");
        assert_eq!(job.worker, "ursa-1");
        assert_eq!(job.image, "cpp");
        assert_eq!(job.job_root, "/srv/build/cpp");
        assert_eq!(job.steps[0].workdir, "/srv/build/cpp/cpp/build");
        assert_eq!(job.properties["ncpus"], "8");

        let submitted = engine.submitted.lock().unwrap();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0], job);
    }

    #[tokio::test]
    async fn test_unschedulable_is_not_submitted() {
        let engine = Arc::new(MockEngine::default());
        let dispatcher = Dispatcher::new(definitions(), Arc::new(catalog()), engine.clone());

        let outcome = dispatcher.dispatch("cpp-cuda").await.unwrap();
        assert!(outcome.is_unschedulable());
        assert!(outcome.job().is_none());
        let Dispatch::Unschedulable(report) = outcome else {
            unreachable!();
        };
        assert_eq!(report.worker_filter, Some(FilterExpr::has_tag("cuda")));
        assert_eq!(report.rejected_workers.len(), 2);
        assert!(engine.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_each_dispatch_reads_a_fresh_snapshot() {
        let catalog = Arc::new(catalog());
        let dispatcher =
            Dispatcher::new(definitions(), catalog.clone(), Arc::new(MockEngine::default()));

        assert!(dispatcher.dispatch("cpp-cuda").await.unwrap().is_unschedulable());

        catalog
            .workers
            .lock()
            .unwrap()
            .push(Resource::new("gpu-1").with_tag("cuda"));
        let outcome = dispatcher.dispatch("cpp-cuda").await.unwrap();
        assert_eq!(outcome.job().unwrap().worker, "gpu-1");
    }

    #[tokio::test]
    async fn test_resolution_and_catalog_errors() {
        let dispatcher = Dispatcher::new(
            definitions(),
            Arc::new(catalog()),
            Arc::new(MockEngine::default()),
        );
        assert!(matches!(
            dispatcher.dispatch("nope").await,
            Err(DispatchError::Resolution(kiln_core::Error::UnknownDefinition(_)))
        ));
        assert!(matches!(
            dispatcher.dispatch("orphan").await,
            Err(DispatchError::Resolution(kiln_core::Error::UnknownParent { .. }))
        ));

        let mut broken = catalog();
        broken.fail = true;
        let dispatcher =
            Dispatcher::new(definitions(), Arc::new(broken), Arc::new(MockEngine::default()));
        assert!(matches!(
            dispatcher.dispatch("cpp").await,
            Err(DispatchError::Catalog(_))
        ));
    }

    #[tokio::test]
    async fn test_builder_name_cannot_escape_job_root() {
        let escaping = BuilderDefinition::new("../../etc");
        let defs: DefinitionSet = [escaping].into_iter().collect();
        let engine = Arc::new(MockEngine::default());
        let dispatcher = Dispatcher::new(Arc::new(defs), Arc::new(catalog()), engine.clone());

        assert!(matches!(
            dispatcher.assembler("../../etc"),
            Err(DispatchError::InvalidJobRoot(_))
        ));
        assert!(matches!(
            dispatcher.dispatch("../../etc").await,
            Err(DispatchError::InvalidJobRoot(ref name)) if name == "../../etc"
        ));
        assert!(engine.submitted.lock().unwrap().is_empty());
        assert_eq!(
            dispatcher.assembler("cpp").unwrap().job_root(),
            "/build/cpp"
        );
    }

    #[tokio::test]
    async fn test_engine_rejection() {
        let engine = Arc::new(MockEngine {
            reject: true,
            ..Default::default()
        });
        let dispatcher = Dispatcher::new(definitions(), Arc::new(catalog()), engine);
        let err = dispatcher.dispatch("cpp").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Execution engine rejected 'cpp': Execution engine error: queue full"
        );
    }

    #[tokio::test]
    async fn test_dispatch_many_keeps_input_order() {
        let engine = Arc::new(MockEngine::default());
        let dispatcher = Dispatcher::new(definitions(), Arc::new(catalog()), engine.clone());

        let results = dispatcher.dispatch_many(&["cpp", "nope", "cpp-cuda"]).await;
        let names: Vec<&str> = results.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["cpp", "nope", "cpp-cuda"]);
        assert!(results[0].1.as_ref().unwrap().job().is_some());
        assert!(results[1].1.is_err());
        assert!(results[2].1.as_ref().unwrap().is_unschedulable());
        assert_eq!(engine.submitted.lock().unwrap().len(), 1);
    }
}
