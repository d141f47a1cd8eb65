use crate::types::{ContainerMeta, ContainerRole, EventType, ResourceEvent, ResourceRecord};
use anyhow::Context;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use k8s_openapi::api::core::v1::{Namespace, Node, NodeCondition, Pod};
use kube::api::{ListParams, WatchEvent, WatchParams};
use kube::{Api, Client, ResourceExt, config};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

pub type EventStream = BoxStream<'static, anyhow::Result<ResourceEvent>>;

/// Where cached resources come from.
#[async_trait]
pub trait ResourceSource: Send + Sync {
    async fn ping(&self, context: &str) -> anyhow::Result<()>;

    /// Open a change feed. The stream ends when the server closes it.
    async fn watch(&self, context: &str, kind: &str) -> anyhow::Result<EventStream>;

    async fn list(&self, context: &str, kind: &str) -> anyhow::Result<Vec<ResourceRecord>>;
}

/// `ResourceSource` backed by one `kube::Client` per context.
pub struct KubeSource {
    clients: HashMap<String, Client>,
}

impl KubeSource {
    pub fn new(clients: HashMap<String, Client>) -> Self {
        Self { clients }
    }

    pub async fn from_kubeconfig(kubeconfig: &Path, contexts: &[String]) -> anyhow::Result<Self> {
        let mut clients = HashMap::new();
        for ctx in contexts {
            let client = client_for_context(kubeconfig, ctx).await?;
            info!(context = %ctx, "created client");
            clients.insert(ctx.clone(), client);
        }
        Ok(Self::new(clients))
    }

    fn client(&self, context: &str) -> anyhow::Result<Client> {
        self.clients
            .get(context)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("context not found: {}", context))
    }
}

pub async fn client_for_context(kubeconfig: &Path, context: &str) -> anyhow::Result<Client> {
    let kc = config::Kubeconfig::read_from(kubeconfig)
        .with_context(|| format!("Failed to read kubeconfig {}", kubeconfig.display()))?;
    let cfg = config::Config::from_custom_kubeconfig(
        kc,
        &config::KubeConfigOptions {
            context: Some(context.to_string()),
            ..Default::default()
        },
    )
    .await
    .map_err(|e| anyhow::anyhow!("Context '{}' not found in kubeconfig: {}", context, e))?;
    debug!(context, host = %cfg.cluster_url, "built client config");
    Ok(Client::try_from(cfg)?)
}

/// The requested context if kubeconfig knows it, else the active one.
pub fn resolve_context(kubeconfig: &config::Kubeconfig, requested: Option<&str>) -> anyhow::Result<String> {
    match requested {
        Some(ctx) => {
            if kubeconfig.contexts.iter().any(|c| c.name == ctx) {
                Ok(ctx.to_string())
            } else {
                anyhow::bail!("unknown context: {}", ctx)
            }
        }
        None => kubeconfig
            .current_context
            .clone()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("couldn't determine active context; please specify one")),
    }
}

/// `proxy-url` of the cluster behind `context`, if any.
pub fn proxy_url(kubeconfig: &config::Kubeconfig, context: &str) -> Option<String> {
    let cluster = kubeconfig
        .contexts
        .iter()
        .find(|c| c.name == context)?
        .context
        .as_ref()?
        .cluster
        .clone();
    kubeconfig
        .clusters
        .iter()
        .find(|c| c.name == cluster)?
        .cluster
        .as_ref()?
        .proxy_url
        .clone()
}

#[async_trait]
impl ResourceSource for KubeSource {
    async fn ping(&self, context: &str) -> anyhow::Result<()> {
        let nodes: Api<Node> = Api::all(self.client(context)?);
        let list = nodes.list(&ListParams::default()).await?;
        debug!(context, count = list.items.len(), "ping listed nodes");
        if list.items.is_empty() {
            anyhow::bail!("no nodes available for context: {}", context);
        }
        Ok(())
    }

    async fn watch(&self, context: &str, kind: &str) -> anyhow::Result<EventStream> {
        match kind {
            "pod" => {
                let pods: Api<Pod> = Api::all(self.client(context)?);
                let stream = pods
                    .watch(&WatchParams::default(), "0")
                    .await
                    .context("watching pods failed")?;
                Ok(stream
                    .filter_map(|event| async move {
                        match event {
                            Ok(WatchEvent::Added(pod)) => {
                                Some(Ok(ResourceEvent::new(EventType::Added, pod_record(&pod))))
                            }
                            Ok(WatchEvent::Modified(pod)) => Some(Ok(ResourceEvent::new(
                                EventType::Modified,
                                pod_record(&pod),
                            ))),
                            Ok(WatchEvent::Deleted(pod)) => Some(Ok(ResourceEvent::new(
                                EventType::Deleted,
                                pod_record(&pod),
                            ))),
                            Ok(WatchEvent::Bookmark(_)) => None,
                            Ok(WatchEvent::Error(err)) => {
                                Some(Err(anyhow::anyhow!("watch error: {:?}", err)))
                            }
                            Err(e) => Some(Err(e.into())),
                        }
                    })
                    .boxed())
            }
            _ => anyhow::bail!("unsupported kind: {}", kind),
        }
    }

    async fn list(&self, context: &str, kind: &str) -> anyhow::Result<Vec<ResourceRecord>> {
        let client = self.client(context)?;
        match kind {
            "node" => {
                let nodes: Api<Node> = Api::all(client);
                let list = nodes.list(&ListParams::default()).await?;
                Ok(list.items.iter().map(node_record).collect())
            }
            "namespace" => {
                let namespaces: Api<Namespace> = Api::all(client);
                let list = namespaces.list(&ListParams::default()).await?;
                Ok(list.items.iter().map(namespace_record).collect())
            }
            _ => anyhow::bail!("unsupported kind: {}", kind),
        }
    }
}

pub fn pod_record(pod: &Pod) -> ResourceRecord {
    let phase = pod
        .status
        .as_ref()
        .and_then(|s| s.phase.clone())
        .unwrap_or_else(|| "Unknown".to_string());
    let message = pod
        .status
        .as_ref()
        .and_then(|s| s.message.as_deref())
        .map(str::trim)
        .unwrap_or("");
    let status = if message.is_empty() {
        phase
    } else {
        format!("{}: {}", phase, message)
    };

    let mut containers = Vec::new();
    if let Some(spec) = &pod.spec {
        for c in spec.init_containers.iter().flatten() {
            containers.push(ContainerMeta {
                name: c.name.clone(),
                role: ContainerRole::InitContainer,
            });
        }
        for c in &spec.containers {
            containers.push(ContainerMeta {
                name: c.name.clone(),
                role: ContainerRole::Container,
            });
        }
    }

    ResourceRecord {
        kind: "pod".to_string(),
        name: pod.name_any(),
        namespace: pod.namespace().unwrap_or_default(),
        resource_version: pod.resource_version().unwrap_or_default(),
        status,
        containers,
    }
}

pub fn node_record(node: &Node) -> ResourceRecord {
    let conditions = node
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_deref())
        .unwrap_or(&[]);
    ResourceRecord {
        kind: "node".to_string(),
        name: node.name_any(),
        namespace: String::new(),
        resource_version: node.resource_version().unwrap_or_default(),
        status: node_status(conditions).to_string(),
        containers: Vec::new(),
    }
}

fn node_status(conditions: &[NodeCondition]) -> &'static str {
    let ready = conditions
        .iter()
        .any(|c| c.type_ == "Ready" && c.status == "True");
    if ready { "Ready" } else { "NotReady" }
}

pub fn namespace_record(ns: &Namespace) -> ResourceRecord {
    ResourceRecord {
        kind: "namespace".to_string(),
        name: ns.name_any(),
        namespace: String::new(),
        resource_version: ns.resource_version().unwrap_or_default(),
        status: ns
            .status
            .as_ref()
            .and_then(|s| s.phase.clone())
            .unwrap_or_else(|| "Unknown".to_string()),
        containers: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{Container, NodeStatus, PodSpec, PodStatus};
    use kube::api::ObjectMeta;

    fn container(name: &str) -> Container {
        Container {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_pod_record_containers_and_status() {
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some("web-1".to_string()),
                namespace: Some("shop".to_string()),
                resource_version: Some("42".to_string()),
                ..Default::default()
            },
            spec: Some(PodSpec {
                init_containers: Some(vec![container("migrate")]),
                containers: vec![container("app"), container("sidecar")],
                ..Default::default()
            }),
            status: Some(PodStatus {
                phase: Some("Pending".to_string()),
                message: Some("waiting for volume".to_string()),
                ..Default::default()
            }),
        };

        let record = pod_record(&pod);
        assert_eq!(record.kind, "pod");
        assert_eq!(record.name, "web-1");
        assert_eq!(record.namespace, "shop");
        assert_eq!(record.resource_version, "42");
        assert_eq!(record.status, "Pending: waiting for volume");
        assert_eq!(
            record.containers,
            vec![
                ContainerMeta {
                    name: "migrate".to_string(),
                    role: ContainerRole::InitContainer
                },
                ContainerMeta {
                    name: "app".to_string(),
                    role: ContainerRole::Container
                },
                ContainerMeta {
                    name: "sidecar".to_string(),
                    role: ContainerRole::Container
                },
            ]
        );
    }

    #[test]
    fn test_pod_record_blank_message_uses_phase() {
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some("web-2".to_string()),
                ..Default::default()
            },
            status: Some(PodStatus {
                phase: Some("Running".to_string()),
                message: Some("  ".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let record = pod_record(&pod);
        assert_eq!(record.status, "Running");
        assert!(record.containers.is_empty());
    }

    #[test]
    fn test_node_status() {
        let ready = NodeCondition {
            type_: "Ready".to_string(),
            status: "True".to_string(),
            ..Default::default()
        };
        let not_ready = NodeCondition {
            type_: "Ready".to_string(),
            status: "False".to_string(),
            ..Default::default()
        };
        let node = |c: NodeCondition| Node {
            metadata: ObjectMeta {
                name: Some("n1".to_string()),
                ..Default::default()
            },
            status: Some(NodeStatus {
                conditions: Some(vec![c]),
                ..Default::default()
            }),
            ..Default::default()
        };

        assert_eq!(node_record(&node(ready)).status, "Ready");
        assert_eq!(node_record(&node(not_ready)).status, "NotReady");
        assert_eq!(node_record(&Node::default()).status, "NotReady");
    }

    const KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
current-context: prod
clusters:
- name: prod-cluster
  cluster:
    server: https://prod.example.com
    proxy-url: http://proxy.example.com:3128
- name: dev-cluster
  cluster:
    server: https://dev.example.com
contexts:
- name: prod
  context:
    cluster: prod-cluster
    user: admin
- name: dev
  context:
    cluster: dev-cluster
    user: admin
users:
- name: admin
  user:
    token: abc
"#;

    #[test]
    fn test_resolve_context() {
        let kc = config::Kubeconfig::from_yaml(KUBECONFIG).unwrap();
        assert_eq!(resolve_context(&kc, None).unwrap(), "prod");
        assert_eq!(resolve_context(&kc, Some("dev")).unwrap(), "dev");
        assert!(resolve_context(&kc, Some("staging")).is_err());

        let empty = config::Kubeconfig::default();
        assert!(resolve_context(&empty, None).is_err());
    }

    #[test]
    fn test_proxy_url() {
        let kc = config::Kubeconfig::from_yaml(KUBECONFIG).unwrap();
        assert_eq!(
            proxy_url(&kc, "prod"),
            Some("http://proxy.example.com:3128".to_string())
        );
        assert_eq!(proxy_url(&kc, "dev"), None);
        assert_eq!(proxy_url(&kc, "missing"), None);
    }
}
