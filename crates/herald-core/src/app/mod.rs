//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: アプリケーションの構築とワイヤリング
//! - **SubmissionHandler**: 受付（denylist veto → PENDING 保存 → enqueue）
//! - **DeliveryWorker**: 1 件を終端状態まで進める
//! - **WorkerGroup**: queue を消費する worker 群
//! - **NotificationService**: 外側から使う facade

pub mod builder;
pub mod deadline;
pub mod service;
pub mod submission;
pub mod worker;
pub mod worker_loop;

// 主要な型を再エクスポート
pub use self::builder::{App, AppBuilder, BuildError};
pub use self::service::{DependencyHealth, HealthReport, NotificationService};
pub use self::submission::{Submission, SubmissionHandler};
pub use self::worker::{DeliveryWorker, ProcessOutcome};
pub use self::worker_loop::WorkerGroup;
