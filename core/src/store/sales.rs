use super::{get_opt_decimal, get_parsed, SettlementStore};
use crate::{
    error::SettlementResult,
    sale::SaleRecord,
    types::{Periodo, Zona},
};
use rusqlite::params;

const SALE_COLUMNS: &str = "order_id, ruc, agencia, zona, fecha_venta, fecha_validacion,
    fecha_instalacion, precio_con_igv, canal, estado,
    recibo_1_pagado, recibo_2_pagado, recibo_3_pagado, periodo";

impl SettlementStore {
    /// Load or correct sale records. Keyed on order_id.
    pub fn upsert_sales(&self, records: &[SaleRecord]) -> SettlementResult<usize> {
        self.in_transaction(|store| {
            let mut stmt = store.conn.prepare(
                "INSERT INTO sale_record (
                    order_id, ruc, agencia, zona, fecha_venta, fecha_validacion,
                    fecha_instalacion, precio_con_igv, canal, estado,
                    recibo_1_pagado, recibo_2_pagado, recibo_3_pagado, periodo
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)
                ON CONFLICT(order_id) DO UPDATE SET
                    ruc = excluded.ruc,
                    agencia = excluded.agencia,
                    zona = excluded.zona,
                    fecha_venta = excluded.fecha_venta,
                    fecha_validacion = excluded.fecha_validacion,
                    fecha_instalacion = excluded.fecha_instalacion,
                    precio_con_igv = excluded.precio_con_igv,
                    canal = excluded.canal,
                    estado = excluded.estado,
                    recibo_1_pagado = excluded.recibo_1_pagado,
                    recibo_2_pagado = excluded.recibo_2_pagado,
                    recibo_3_pagado = excluded.recibo_3_pagado,
                    periodo = excluded.periodo",
            )?;
            for r in records {
                stmt.execute(params![
                    r.order_id,
                    r.ruc,
                    r.agencia,
                    r.zona.as_str(),
                    r.fecha_venta,
                    r.fecha_validacion,
                    r.fecha_instalacion,
                    r.precio_con_igv.map(|p| p.to_string()),
                    r.canal,
                    r.estado,
                    r.recibos_pagados[0],
                    r.recibos_pagados[1],
                    r.recibos_pagados[2],
                    r.periodo.as_u32(),
                ])?;
            }
            Ok(records.len())
        })
    }

    /// Validated sales of `zona` installed within the period.
    /// The LIMA channel filter is applied by the aggregator.
    pub fn sales_for_period(
        &self,
        periodo: Periodo,
        zona: Zona,
    ) -> SettlementResult<Vec<SaleRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SALE_COLUMNS}
             FROM sale_record
             WHERE zona = ?1
               AND fecha_validacion IS NOT NULL
               AND fecha_instalacion >= ?2 AND fecha_instalacion < ?3
             ORDER BY order_id ASC"
        ))?;
        let rows = stmt
            .query_map(params![zona.as_str(), periodo.start(), periodo.end()], |row| {
                Ok(SaleRecord {
                    order_id: row.get(0)?,
                    ruc: row.get(1)?,
                    agencia: row.get(2)?,
                    zona: get_parsed::<Zona, String>(row, 3)?,
                    fecha_venta: row.get(4)?,
                    fecha_validacion: row.get(5)?,
                    fecha_instalacion: row.get(6)?,
                    precio_con_igv: get_opt_decimal(row, 7)?,
                    canal: row.get(8)?,
                    estado: row.get(9)?,
                    recibos_pagados: [row.get(10)?, row.get(11)?, row.get(12)?],
                    periodo: get_parsed::<Periodo, u32>(row, 13)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn sale_count(&self) -> SettlementResult<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM sale_record", [], |row| row.get(0))?;
        Ok(count)
    }
}
