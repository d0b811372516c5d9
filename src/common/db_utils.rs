use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::common::error::AppError;

// ---
// Helper RLS: A "Chave" para o Banco de Dados
// ---
/// Abre uma transação com `app.tenant_id` definido, para que as políticas RLS
/// restrinjam todas as queries seguintes à empresa do chamador.
pub(crate) async fn begin_tenant_tx(
    pool: &PgPool,
    tenant_id: Uuid,
) -> Result<Transaction<'static, Postgres>, AppError> {
    // O operador '?' converte automaticamente sqlx::Error -> AppError::DatabaseError
    let mut tx = pool.begin().await?;

    // `true` = vale só até o fim da transação
    sqlx::query("SELECT set_config('app.tenant_id', $1, true)")
        .bind(tenant_id.to_string())
        .execute(&mut *tx)
        .await?;

    Ok(tx)
}

/// Lock consultivo por entregador, liberado no commit/rollback. Serializa as escritas
/// de um mesmo entregador para que a checagem de conflito de horário seja atômica.
pub(crate) async fn lock_driver(
    tx: &mut Transaction<'static, Postgres>,
    driver_id: Uuid,
) -> Result<(), AppError> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
        .bind(driver_id.to_string())
        .execute(&mut **tx)
        .await?;
    Ok(())
}
