use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "support_messages")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub sender_role: String,
    pub content: String,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::support_conversations::Entity",
        from = "Column::ConversationId",
        to = "super::support_conversations::Column::Id"
    )]
    SupportConversations,
}

impl Related<super::support_conversations::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SupportConversations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
