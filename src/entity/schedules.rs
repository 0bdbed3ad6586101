use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "schedules")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub product_id: Uuid,
    pub boat_id: Option<Uuid>,
    pub departure_port: String,
    pub arrival_port: String,
    /// Local "HH:MM".
    pub departure_time: String,
    /// Local "HH:MM".
    pub arrival_time: String,
    pub capacity: Option<i32>,
    pub price_idr: i64,
    pub is_active: bool,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::products::Entity",
        from = "Column::ProductId",
        to = "super::products::Column::Id"
    )]
    Products,
    #[sea_orm(
        belongs_to = "super::boats::Entity",
        from = "Column::BoatId",
        to = "super::boats::Column::Id"
    )]
    Boats,
}

impl Related<super::products::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Products.def()
    }
}

impl Related<super::boats::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Boats.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
