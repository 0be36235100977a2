use bootstage::prelude::*;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// A tiny TCP listener that greets every connection
///
/// The socket is bound while `starting` and served once `running`.
#[derive(Default)]
struct Listener {
    socket: Mutex<Option<TcpListener>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

pub struct HttpModule;

impl Module for HttpModule {
    fn register(&self, stages: &StageRegistry<Application>) -> Result<(), LifecycleError> {
        let listener = Arc::new(Listener::default());

        let bind = Arc::clone(&listener);
        stages.up("starting")?.initializer(
            "http.bind",
            InitializerOptions::new(),
            move |app: Application| {
                let bind = Arc::clone(&bind);
                async move {
                    let host = app
                        .config()
                        .get_str("http.host")
                        .unwrap_or_else(|| "127.0.0.1".into());
                    let port = app.config().get_as::<u16>("http.port")?.unwrap_or(3000);
                    let socket = TcpListener::bind((host.as_str(), port)).await?;
                    tracing::info!("Listening on {}", socket.local_addr()?);
                    *bind.socket.lock().await = Some(socket);
                    Ok(())
                }
            },
        );

        let serve = Arc::clone(&listener);
        stages.up("running")?.initializer(
            "http.serve",
            InitializerOptions::new(),
            move |app: Application| {
                let serve = Arc::clone(&serve);
                async move {
                    let socket = serve
                        .socket
                        .lock()
                        .await
                        .take()
                        .ok_or_else(|| anyhow::anyhow!("http.bind did not run"))?;
                    let greeting = format!("hello from {}\n", app.name());
                    let task = tokio::spawn(async move {
                        while let Ok((mut stream, peer)) = socket.accept().await {
                            tracing::debug!(%peer, "Accepted connection");
                            if let Err(e) = stream.write_all(greeting.as_bytes()).await {
                                tracing::warn!(%peer, "Write failed: {}", e);
                            }
                        }
                    });
                    *serve.task.lock().await = Some(task);
                    Ok(())
                }
            },
        );

        let stop = listener;
        stages.down("running")?.initializer(
            "http.stop",
            InitializerOptions::new(),
            move |_app: Application| {
                let stop = Arc::clone(&stop);
                async move {
                    if let Some(task) = stop.task.lock().await.take() {
                        task.abort();
                        tracing::info!("Stopped accepting connections");
                    }
                    Ok(())
                }
            },
        );

        Ok(())
    }
}
